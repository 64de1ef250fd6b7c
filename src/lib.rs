pub mod config;         // loads treasury.toml, shared AppState for axum
pub mod error;          // LedgerError / ChainError taxonomy
pub mod model;          // Treasury, Member, Role table, Transaction, ChainLog
pub mod storage;        // sled-backed ledger store, CAS updates
pub mod treasury;       // treasury + member provisioning
pub mod ledger;         // transaction state machine (create/confirm/reject/delete)
pub mod balance;        // balance aggregation over confirmed transactions
pub mod anchor;         // anchor writer: claim + worker pool submitting to chain
pub mod retry;          // manual retry + periodic reconciliation sweep
pub mod chain;          // chain client trait, abi encoding, rpc + memory transports
pub mod auth;           // bearer token -> Actor
pub mod utils;          // timestamps, http error mapping
pub mod handlers;       // handlers for Axum API
pub mod mode;           // per-mode orchestration logic
