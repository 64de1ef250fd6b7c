//! Blockchain side of anchoring.
//!
//! The anchor writer only sees [`ChainClient`]; which transport sits behind it
//! (in-memory dev chain, node-managed account, locally signed transactions) is
//! a configuration choice made in [`from_config`].

pub mod abi;
pub mod memory;
pub mod rpc;

use crate::{
    config::{ChainConfig, TransportKind},
    error::ChainError,
    model::{Transaction, TxKind},
    utils::{hex0x, parse_hex_array},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{fmt, str::FromStr, sync::Arc};
use uuid::Uuid;

/// 20-byte account / contract address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_array::<20>(s)
            .map(Address)
            .ok_or_else(|| ChainError::Malformed(format!("invalid address `{s}`")))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex0x(&self.0))
    }
}

/// Arguments of the contract's `logTransaction` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorEntry {
    pub treasury:    Address,
    pub amount:      u64,
    pub is_income:   bool,
    pub detail_hash: [u8; 32],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub block_number: u64,
    pub success:      bool,
    pub gas_used:     u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submits `logTransaction(treasury, amount, isIncome, detailHash)`.
    /// Returns the transaction hash; the entry is only final once a receipt
    /// shows up.
    async fn log_transaction(&self, entry: &AnchorEntry) -> Result<String, ChainError>;

    /// `None` while the transaction is not mined (or unknown).
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError>;

    /// Read-only audit helper: number of entries the contract holds for a treasury.
    async fn treasury_log_count(&self, treasury: &Address) -> Result<u64, ChainError>;
}

/// Binds the off-chain record to the on-chain entry. The note goes into the
/// digest but never onto the chain.
pub fn detail_hash(tx: &Transaction, amount: u64) -> [u8; 32] {
    let data = format!(
        "{}|{}|{}|{}|{}|{}",
        tx.treasury_id,
        tx.id,
        tx.kind.as_str(),
        amount,
        tx.note.as_deref().unwrap_or(""),
        tx.created_at_ms,
    );
    abi::keccak256(data.as_bytes())
}

/// Deterministic per-treasury address: last 20 bytes of keccak("treasury:" ++ id).
pub fn treasury_address(treasury_id: &Uuid) -> Address {
    let mut preimage = b"treasury:".to_vec();
    preimage.extend_from_slice(treasury_id.as_bytes());
    let hash = abi::keccak256(&preimage);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    Address(addr)
}

pub fn anchor_entry(tx: &Transaction, treasury: Address, amount: u64) -> AnchorEntry {
    AnchorEntry {
        treasury,
        amount,
        is_income:   tx.kind == TxKind::Income,
        detail_hash: detail_hash(tx, amount),
    }
}

/// Builds the configured transport.
pub async fn from_config(cfg: &ChainConfig) -> Result<Arc<dyn ChainClient>> {
    match cfg.transport {
        TransportKind::Memory => {
            tracing::warn!("using in-memory chain; anchors are not durable");
            Ok(Arc::new(memory::MemoryChain::new()))
        }
        TransportKind::Unlocked | TransportKind::Signed => {
            let client = rpc::RpcChain::connect(cfg)
                .await
                .context("initialising json-rpc chain client")?;
            Ok(Arc::new(client))
        }
    }
}
