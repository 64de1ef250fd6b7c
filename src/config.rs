use crate::{
    anchor::AnchorWriter,
    balance::BalanceAggregator,
    chain::ChainClient,
    ledger::Ledger,
    retry::RetryManager,
    storage::LedgerStore,
    treasury::TreasuryRegistry,
};

use serde::Deserialize;
use std::{fs, sync::Arc, time::Duration};
use anyhow::{Context, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub listen: String,                     // ex 0.0.0.0:8080
    pub https_cert: Option<String>,         // TLS is on when both are set
    pub https_key: Option<String>,
    pub sled_path: String,                  // "/var/lib/treasury/ledger"
    pub auth: AuthConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub anchor: AnchorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub policy: ConfirmPolicy,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,                 // HS256
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Memory,                                 // in-process dev chain
    Unlocked,                               // node-managed account, eth_sendTransaction
    Signed,                                 // local key, eth_sendRawTransaction
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub transport: TransportKind,
    pub rpc_url: String,                    // ex http://localhost:8545
    pub contract_address: String,           // TreasuryLogger
    pub sender_address: Option<String>,     // unlocked only
    pub private_key_env: String,            // signed only; env var holding hex key
    pub chain_id: Option<u64>,              // signed only; asked from the node if absent
    pub gas_limit: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            transport:        TransportKind::Memory,
            rpc_url:          "http://localhost:8545".into(),
            contract_address: String::new(),
            sender_address:   None,
            private_key_env:  "TREASURY_PRIVATE_KEY".into(),
            chain_id:         None,
            gas_limit:        100_000,
            rpc_timeout_ms:   10_000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub workers: usize,                     // concurrent chain writes
    pub queue_capacity: usize,
    pub submit_timeout_ms: u64,
    pub receipt_timeout_ms: u64,
    pub receipt_poll_ms: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        AnchorConfig {
            workers:            4,
            queue_capacity:     1024,
            submit_timeout_ms:  30_000,
            receipt_timeout_ms: 120_000,
            receipt_poll_ms:    2_000,
        }
    }
}

impl AnchorConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    /// Longest a single attempt can hold its claim: the receipt check on an
    /// earlier hash, the submission, then receipt polling whose final call
    /// may start just before the receipt deadline.
    pub fn worst_case_attempt_ms(&self) -> u64 {
        self.submit_timeout_ms
            .saturating_mul(3)
            .saturating_add(self.receipt_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub sweep_interval_ms: u64,
    pub backoff_base_ms: u64,               // wait after attempt 1, doubled per attempt
    pub backoff_max_ms: u64,
    pub max_attempts: u32,                  // sweep stops here; manual retry still allowed
    pub pending_stale_after_ms: u64,        // pending older than this is reclassified failed
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            sweep_interval_ms:      30_000,
            backoff_base_ms:        60_000,
            backoff_max_ms:         3_600_000,
            max_attempts:           5,
            pending_stale_after_ms: 300_000,
        }
    }
}

impl RetryConfig {
    /// Wait required after `attempts` failed attempts before the sweep tries again.
    pub fn backoff_ms(&self, attempts: u32) -> u64 {
        let exp = attempts.saturating_sub(1).min(32);
        self.backoff_base_ms
            .saturating_mul(1u64 << exp)
            .min(self.backoff_max_ms)
    }
}

/// How far a confirmed amount may drift from the proposal without a note.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConfirmPolicy {
    pub justification_threshold_bps: Option<u32>,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file `{}`", path))?;
        Self::parse(&s)
            .with_context(|| format!("parsing `{}` as TOML", path))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        if cfg.anchor.workers == 0 {
            anyhow::bail!("anchor.workers must be at least 1");
        }
        if cfg.chain.transport != TransportKind::Memory && cfg.chain.contract_address.is_empty() {
            anyhow::bail!("chain.contract_address is required for {:?} transport", cfg.chain.transport);
        }
        let attempt_ms = cfg.anchor.worst_case_attempt_ms();
        if cfg.retry.pending_stale_after_ms <= attempt_ms {
            anyhow::bail!(
                "retry.pending_stale_after_ms ({}) must exceed the longest anchor attempt ({attempt_ms} ms)",
                cfg.retry.pending_stale_after_ms
            );
        }
        Ok(cfg)
    }
}

pub fn load(path: &str) -> Result<AppConfig> {
    AppConfig::load(path)
}

#[derive(Clone)]
pub struct AppState { // everything the handlers need, cheap to clone
    pub cfg:        Arc<AppConfig>,
    pub store:      LedgerStore,
    pub treasuries: TreasuryRegistry,
    pub ledger:     Ledger,
    pub balances:   BalanceAggregator,
    pub retry:      RetryManager,
    pub anchor:     AnchorWriter,
    pub chain:      Arc<dyn ChainClient>,
}

impl AppState {
    /// Wires the workflow components around one store and one anchor queue.
    pub fn new(cfg: AppConfig, store: LedgerStore, chain: Arc<dyn ChainClient>, anchor: AnchorWriter) -> Self {
        AppState {
            treasuries: TreasuryRegistry::new(store.clone()),
            ledger:     Ledger::new(store.clone(), anchor.clone(), cfg.policy.clone()),
            balances:   BalanceAggregator::new(store.clone()),
            retry:      RetryManager::new(store.clone(), anchor.clone(), cfg.retry.clone()),
            cfg:        Arc::new(cfg),
            store,
            anchor,
            chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        listen = "127.0.0.1:8080"
        sled_path = "/tmp/ledger"
        [auth]
        jwt_secret = "s3cret"
    "#;

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = AppConfig::parse(MINIMAL).unwrap();
        assert_eq!(cfg.chain.transport, TransportKind::Memory);
        assert_eq!(cfg.anchor.workers, 4);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.policy.justification_threshold_bps, None);
        assert!(cfg.https_cert.is_none());
    }

    #[test]
    fn rpc_transport_needs_contract() {
        let s = format!("{MINIMAL}\n[chain]\ntransport = \"unlocked\"\n");
        assert!(AppConfig::parse(&s).is_err());

        let s = format!(
            "{MINIMAL}\n[chain]\ntransport = \"signed\"\ncontract_address = \"0x{}\"\n",
            "ab".repeat(20)
        );
        assert_eq!(AppConfig::parse(&s).unwrap().chain.transport, TransportKind::Signed);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let r = RetryConfig { backoff_base_ms: 1_000, backoff_max_ms: 5_000, ..Default::default() };
        assert_eq!(r.backoff_ms(0), 1_000);
        assert_eq!(r.backoff_ms(1), 1_000);
        assert_eq!(r.backoff_ms(2), 2_000);
        assert_eq!(r.backoff_ms(3), 4_000);
        assert_eq!(r.backoff_ms(4), 5_000);
        assert_eq!(r.backoff_ms(60), 5_000);
    }

    #[test]
    fn stale_window_must_outlast_an_attempt() {
        let cfg = AppConfig::parse(MINIMAL).unwrap();
        assert_eq!(cfg.anchor.worst_case_attempt_ms(), 210_000);

        let s = format!("{MINIMAL}\n[retry]\npending_stale_after_ms = 210000\n");
        assert!(AppConfig::parse(&s).is_err());

        let s = format!(
            "{MINIMAL}\n[anchor]\nsubmit_timeout_ms = 1000\nreceipt_timeout_ms = 5000\n[retry]\npending_stale_after_ms = 8001\n"
        );
        assert_eq!(AppConfig::parse(&s).unwrap().retry.pending_stale_after_ms, 8_001);
    }
}
