//! Manual retry and the periodic reconciliation sweep.
//!
//! Both paths go through `AnchorWriter::enqueue`, so the chain-log claim
//! stays the single guard against two writes in flight for one transaction.

use crate::{
    anchor::{fail_attempt, AnchorJob, AnchorWriter, Enqueue},
    config::RetryConfig,
    error::{ChainError, LedgerError, LedgerResult},
    model::{Actor, Capability, ChainLog, ChainStatus, TxStatus},
    storage::LedgerStore,
    treasury::authorize,
    utils::now_ms,
};

use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reclassified: usize,    // stale pending -> failed
    pub requeued:     usize,
    pub exhausted:    usize,    // at max_attempts, waiting for an operator
}

#[derive(Clone)]
pub struct RetryManager {
    store:  LedgerStore,
    anchor: AnchorWriter,
    cfg:    RetryConfig,
}

impl RetryManager {
    pub fn new(store: LedgerStore, anchor: AnchorWriter, cfg: RetryConfig) -> Self {
        RetryManager { store, anchor, cfg }
    }

    /// Operator retry. Allowed for `none` and `failed` logs, including
    /// non-retryable failures and logs past the attempt ceiling.
    pub fn retry(&self, treasury_id: &Uuid, tx_id: &Uuid, actor: &Actor) -> LedgerResult<ChainLog> {
        authorize(&self.store, treasury_id, actor, Capability::RetryAnchor)?;

        let tx = self.store
            .transaction(treasury_id, tx_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))?;
        if tx.status != TxStatus::Confirmed {
            return Err(LedgerError::state(format!(
                "transaction is {:?}; only confirmed transactions can be anchored",
                tx.status
            )));
        }
        if let Some(log) = self.store.chain_log(tx_id)? {
            match log.status {
                ChainStatus::Pending => return Err(LedgerError::state("an anchor write is already in flight")),
                ChainStatus::Success => return Err(LedgerError::state("transaction is already anchored")),
                ChainStatus::None | ChainStatus::Failed => {}
            }
        }

        match self.anchor.enqueue(treasury_id, tx_id)? {
            Enqueue::Queued(job) => {
                info!(treasury = %treasury_id, transaction = %tx_id, attempt = job.attempt, actor = %actor.user_id, "manual anchor retry");
                self.store
                    .chain_log(tx_id)?
                    .ok_or_else(|| LedgerError::NotFound(format!("chain log {tx_id}")))
            }
            Enqueue::Busy(_) => Err(LedgerError::state("anchor queue is full; try again shortly")),
            Enqueue::InFlight => Err(LedgerError::state("an anchor write is already in flight")),
            Enqueue::AlreadyAnchored => Err(LedgerError::state("transaction is already anchored")),
        }
    }

    /// One reconciliation pass as of `now` (unix ms).
    pub fn sweep_at(&self, now: i64) -> LedgerResult<SweepReport> {
        let mut report = SweepReport::default();

        for log in self.store.chain_logs()? {
            let last = log.last_attempt_at_ms.unwrap_or(log.updated_at_ms);
            match log.status {
                ChainStatus::Success => {}
                ChainStatus::Pending => {
                    if last + self.cfg.pending_stale_after_ms as i64 > now {
                        continue;
                    }
                    let job = AnchorJob {
                        treasury_id:    log.treasury_id,
                        transaction_id: log.transaction_id,
                        attempt:        log.attempt_count,
                    };
                    let stale = ChainError::Timeout(Duration::from_millis(self.cfg.pending_stale_after_ms));
                    if fail_attempt(&self.store, &job, &stale)?.is_some() {
                        warn!(transaction = %log.transaction_id, attempt = log.attempt_count, "stale pending anchor marked failed");
                        report.reclassified += 1;
                    }
                }
                ChainStatus::None | ChainStatus::Failed => {
                    if log.status == ChainStatus::Failed && !log.retryable {
                        continue;
                    }
                    if log.attempt_count >= self.cfg.max_attempts {
                        report.exhausted += 1;
                        continue;
                    }
                    let Some(tx) = self.store.transaction(&log.treasury_id, &log.transaction_id)? else {
                        continue;
                    };
                    if tx.status != TxStatus::Confirmed {
                        continue;
                    }
                    let since = match log.status {
                        ChainStatus::None => tx.decided_at_ms.unwrap_or(tx.created_at_ms),
                        _ => last,
                    };
                    if since + self.cfg.backoff_ms(log.attempt_count) as i64 > now {
                        continue;
                    }

                    if !self.anchor.has_capacity() {
                        warn!("anchor queue full, ending sweep early");
                        break;
                    }
                    match self.anchor.enqueue(&log.treasury_id, &log.transaction_id)? {
                        Enqueue::Queued(_) => report.requeued += 1,
                        Enqueue::Busy(_) => {
                            warn!("anchor queue full, ending sweep early");
                            break;
                        }
                        other => debug!(transaction = %log.transaction_id, outcome = ?other, "sweep skipped"),
                    }
                }
            }
        }
        Ok(report)
    }

    /// Runs `sweep_at` every `sweep_interval_ms` until the task is dropped.
    pub async fn sweep_loop(self) -> anyhow::Result<()> {
        let mut tick = interval(Duration::from_millis(self.cfg.sweep_interval_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(every_ms = self.cfg.sweep_interval_ms, max_attempts = self.cfg.max_attempts, "anchor sweep started");

        loop {
            tick.tick().await;
            match self.sweep_at(now_ms()) {
                Ok(r) if r == SweepReport::default() => {}
                Ok(r) => info!(reclassified = r.reclassified, requeued = r.requeued, exhausted = r.exhausted, "anchor sweep"),
                Err(e) => error!(error = %e, "anchor sweep failed"),
            }
        }
    }
}
