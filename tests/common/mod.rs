#![allow(dead_code)]

use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};
use treasury_anchor::{
    anchor::{anchor_loop, AnchorWorker, AnchorWriter},
    chain::memory::MemoryChain,
    config::{AppConfig, AppState},
    ledger::NewTransaction,
    model::{Actor, ChainLog, ChainStatus, Role, Transaction, TxKind},
    storage::LedgerStore,
};
use uuid::Uuid;

pub const SECRET: &str = "test-secret";

const CONFIG: &str = r#"
    listen = "127.0.0.1:0"
    sled_path = "unused"
    [auth]
    jwt_secret = "test-secret"
    [anchor]
    workers = 2
    queue_capacity = 64
    submit_timeout_ms = 100
    receipt_timeout_ms = 200
    receipt_poll_ms = 10
    [retry]
    backoff_base_ms = 50
    max_attempts = 3
"#;

pub struct Harness {
    pub state:     AppState,
    pub chain:     Arc<MemoryChain>,
    pub treasury:  Uuid,
    pub admin:     Actor,
    pub treasurer: Actor,
    pub member:    Actor,
}

/// Full workflow over a temporary store and the in-memory chain, with the
/// anchor loop running.
pub fn harness() -> Harness {
    let cfg = AppConfig::parse(CONFIG).unwrap();
    let store = LedgerStore::temporary().unwrap();
    let chain = Arc::new(MemoryChain::new());

    let (anchor, rx) = AnchorWriter::new(store.clone(), cfg.anchor.queue_capacity);
    let worker = AnchorWorker::new(store.clone(), chain.clone(), cfg.anchor.clone());
    tokio::spawn(anchor_loop(worker, rx));

    let state = AppState::new(cfg, store, chain.clone(), anchor);
    let admin = Actor::new(Uuid::new_v4());
    let treasurer = Actor::new(Uuid::new_v4());
    let member = Actor::new(Uuid::new_v4());
    let treasury = state.treasuries.create(&admin, "Club fund", None).unwrap().id;
    state.treasuries.grant_role(&treasury, &admin, treasurer.user_id, Role::Treasurer).unwrap();
    state.treasuries.grant_role(&treasury, &admin, member.user_id, Role::Member).unwrap();

    Harness { state, chain, treasury, admin, treasurer, member }
}

/// Polls until the chain log leaves pending or `limit` runs out.
pub async fn wait_settled(store: &LedgerStore, tx_id: &Uuid, limit: Duration) -> Option<ChainLog> {
    let deadline = Instant::now() + limit;
    loop {
        let log = store.chain_log(tx_id).unwrap();
        if matches!(&log, Some(l) if l.status != ChainStatus::Pending) || Instant::now() >= deadline {
            return log;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

impl Harness {
    pub fn propose(&self, kind: TxKind, amount: i64) -> Transaction {
        self.state.ledger
            .create(&self.treasury, &self.member, NewTransaction { kind, amount, note: Some("receipt #1".into()) })
            .unwrap()
    }

    pub fn confirm(&self, tx: &Transaction, amount: i64) -> Transaction {
        self.state.ledger
            .confirm(&self.treasury, &tx.id, &self.treasurer, amount, None, None)
            .unwrap()
    }

    pub async fn settled(&self, tx_id: &Uuid) -> ChainLog {
        wait_settled(&self.state.store, tx_id, Duration::from_secs(3))
            .await
            .unwrap()
    }

    pub fn balance(&self) -> i128 {
        self.state.balances.summary(&self.treasury, &self.member).unwrap().balance
    }
}
