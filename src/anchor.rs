//! Write-behind of confirmed transactions to the chain.
//!
//! `AnchorWriter::enqueue` runs on the request path and only touches the
//! store: it claims the chain log (none/failed -> pending, attempt + 1) with a
//! compare-and-swap and hands the job to the worker pool. The claim is the
//! per-transaction lock: a second enqueue while one attempt is pending is
//! dropped. All chain RPC waits happen in `anchor_loop` tasks.

use crate::{
    chain::{anchor_entry, Address, ChainClient, Receipt},
    config::AnchorConfig,
    error::{ChainError, LedgerError, LedgerResult},
    model::{ChainLog, ChainStatus, Transaction, TxStatus},
    storage::LedgerStore,
    utils::{hex0x, now_ms},
};

use std::sync::Arc;
use tokio::{
    sync::{mpsc, Semaphore},
    time::{sleep, timeout, Instant},
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One claimed attempt. `attempt` equals the chain log's `attempt_count` at
/// claim time and is the idempotency key of the write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorJob {
    pub treasury_id:    Uuid,
    pub transaction_id: Uuid,
    pub attempt:        u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enqueue {
    Queued(AnchorJob),
    /// Another attempt is pending; nothing submitted.
    InFlight,
    /// Chain log already reports success.
    AlreadyAnchored,
    /// Worker queue full or closed. The claim was released and the chain log
    /// is back where it was, attempt count included.
    Busy(ChainLog),
}

/// Request-side handle. Cheap to clone.
#[derive(Clone)]
pub struct AnchorWriter {
    store: LedgerStore,
    queue: mpsc::Sender<AnchorJob>,
}

impl AnchorWriter {
    pub fn new(store: LedgerStore, capacity: usize) -> (Self, mpsc::Receiver<AnchorJob>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (AnchorWriter { store, queue }, rx)
    }

    /// Claims the chain log of a confirmed transaction and queues the write.
    pub fn enqueue(&self, treasury_id: &Uuid, tx_id: &Uuid) -> LedgerResult<Enqueue> {
        let tx = self.store
            .transaction(treasury_id, tx_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))?;
        if tx.status != TxStatus::Confirmed {
            return Err(LedgerError::state(format!(
                "only confirmed transactions are anchored (status {:?})",
                tx.status
            )));
        }

        let now = now_ms();
        let mut refused = Enqueue::InFlight;
        let mut previous = None;
        let claimed = self.store.update_chain_log(tx_id, |cur| {
            let mut log = cur.unwrap_or_else(|| ChainLog::new(*treasury_id, *tx_id, now));
            previous = Some(log.clone());
            match log.status {
                ChainStatus::Pending => {
                    refused = Enqueue::InFlight;
                    Ok(None)
                }
                ChainStatus::Success => {
                    refused = Enqueue::AlreadyAnchored;
                    Ok(None)
                }
                ChainStatus::None | ChainStatus::Failed => {
                    log.status             = ChainStatus::Pending;
                    log.attempt_count     += 1;
                    log.last_attempt_at_ms = Some(now);
                    log.error_detail       = None;
                    log.retryable          = true;
                    log.updated_at_ms      = now;
                    Ok(Some(log))
                }
            }
        })?;

        let Some(log) = claimed else {
            debug!(transaction = %tx_id, outcome = ?refused, "anchor request dropped");
            return Ok(refused);
        };

        let job = AnchorJob {
            treasury_id:    *treasury_id,
            transaction_id: *tx_id,
            attempt:        log.attempt_count,
        };
        match self.queue.try_send(job) {
            Ok(()) => {
                info!(treasury = %treasury_id, transaction = %tx_id, attempt = job.attempt, "anchor write queued");
                Ok(Enqueue::Queued(job))
            }
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_)   => "anchor queue full",
                    mpsc::error::TrySendError::Closed(_) => "anchor writer stopped",
                };
                warn!(transaction = %tx_id, attempt = job.attempt, reason, "anchor write not queued, claim released");
                let restored = match previous {
                    Some(prev) => self.release(&job, prev)?,
                    None => log,
                };
                Ok(Enqueue::Busy(restored))
            }
        }
    }

    /// Whether the worker queue can take another job right now.
    pub fn has_capacity(&self) -> bool {
        self.queue.capacity() > 0
    }

    /// Puts the chain log back to its pre-claim state, unless something else
    /// moved it on meanwhile. Queue refusals never count as chain attempts.
    fn release(&self, job: &AnchorJob, previous: ChainLog) -> LedgerResult<ChainLog> {
        let mut current = None;
        let restored = self.store.update_chain_log(&job.transaction_id, |cur| {
            current = cur.clone();
            match cur {
                Some(log) if log.status == ChainStatus::Pending && log.attempt_count == job.attempt => {
                    Ok(Some(previous.clone()))
                }
                _ => Ok(None),
            }
        })?;
        restored
            .or(current)
            .ok_or_else(|| LedgerError::NotFound(format!("chain log {}", job.transaction_id)))
    }
}

/// Records a failed attempt, unless the log has moved on to a newer attempt
/// or already succeeded.
pub(crate) fn fail_attempt(store: &LedgerStore, job: &AnchorJob, err: &ChainError) -> LedgerResult<Option<ChainLog>> {
    let now = now_ms();
    store.update_chain_log(&job.transaction_id, |cur| {
        let Some(mut log) = cur else { return Ok(None) };
        if log.attempt_count != job.attempt || log.status == ChainStatus::Success {
            return Ok(None);
        }
        log.status        = ChainStatus::Failed;
        log.error_detail  = Some(err.to_string());
        log.retryable     = err.is_transient();
        log.updated_at_ms = now;
        Ok(Some(log))
    })
}

/// Background side: owns the chain client.
#[derive(Clone)]
pub struct AnchorWorker {
    store: LedgerStore,
    chain: Arc<dyn ChainClient>,
    cfg:   AnchorConfig,
}

impl AnchorWorker {
    pub fn new(store: LedgerStore, chain: Arc<dyn ChainClient>, cfg: AnchorConfig) -> Self {
        AnchorWorker { store, chain, cfg }
    }

    /// Runs one claimed attempt to completion and returns the resulting log.
    /// `Ok(None)` means the job was stale and nothing was sent.
    pub async fn process(&self, job: AnchorJob) -> LedgerResult<Option<ChainLog>> {
        let Some(log) = self.store.chain_log(&job.transaction_id)? else {
            debug!("no chain log, dropping job");
            return Ok(None);
        };
        if log.status != ChainStatus::Pending || log.attempt_count != job.attempt {
            debug!(status = ?log.status, current = log.attempt_count, "stale anchor job dropped");
            return Ok(None);
        }

        let result = self.attempt(&job, &log).await;
        match result {
            Ok((tx_hash, receipt)) => self.succeed(&job, tx_hash, receipt),
            Err(e) => {
                if e.is_transient() {
                    warn!(error = %e, "anchor attempt failed (transient)");
                } else {
                    error!(error = %e, "anchor attempt failed (permanent)");
                }
                fail_attempt(&self.store, &job, &e)
            }
        }
    }

    async fn attempt(&self, job: &AnchorJob, log: &ChainLog) -> Result<(String, Receipt), ChainError> {
        let tx = self.load_confirmed(job)?;
        let amount = tx.confirmed_amount
            .ok_or_else(|| ChainError::Malformed("confirmed transaction without confirmed amount".into()))?;
        let treasury: Address = self.store
            .treasury(&job.treasury_id)
            .map_err(|e| ChainError::Unavailable(format!("ledger store: {e}")))?
            .ok_or_else(|| ChainError::Malformed(format!("treasury {} missing", job.treasury_id)))?
            .chain_address
            .parse()?;

        // an earlier attempt may have landed after we gave up on it
        if let Some(prev) = &log.tx_hash {
            match self.bounded(self.chain.transaction_receipt(prev)).await {
                Ok(Some(r)) if r.success => {
                    info!(tx_hash = %prev, block = r.block_number, "earlier submission found mined");
                    return Ok((prev.clone(), r));
                }
                other => debug!(tx_hash = %prev, result = ?other, "earlier submission not usable, resubmitting"),
            }
        }

        let entry = anchor_entry(&tx, treasury, amount);
        let tx_hash = self.bounded(self.chain.log_transaction(&entry)).await?;
        info!(tx_hash = %tx_hash, "anchor submitted, awaiting receipt");
        self.record_submission(job, &tx_hash, &entry.detail_hash, amount)
            .map_err(|e| ChainError::Unavailable(format!("ledger store: {e}")))?;

        let receipt = self.wait_receipt(&tx_hash).await?;
        if !receipt.success {
            return Err(ChainError::Reverted(format!(
                "transaction {tx_hash} failed in block {}",
                receipt.block_number
            )));
        }
        Ok((tx_hash, receipt))
    }

    fn load_confirmed(&self, job: &AnchorJob) -> Result<Transaction, ChainError> {
        let tx = self.store
            .transaction(&job.treasury_id, &job.transaction_id)
            .map_err(|e| ChainError::Unavailable(format!("ledger store: {e}")))?
            .ok_or_else(|| ChainError::Malformed(format!("transaction {} missing", job.transaction_id)))?;
        if tx.status != TxStatus::Confirmed {
            return Err(ChainError::Malformed(format!(
                "transaction is {:?}, not anchoring",
                tx.status
            )));
        }
        Ok(tx)
    }

    /// Every single chain call carries the submit timeout.
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, ChainError>>,
    ) -> Result<T, ChainError> {
        let limit = self.cfg.submit_timeout();
        timeout(limit, fut)
            .await
            .unwrap_or(Err(ChainError::Timeout(limit)))
    }

    async fn wait_receipt(&self, tx_hash: &str) -> Result<Receipt, ChainError> {
        let deadline = Instant::now() + self.cfg.receipt_timeout();
        loop {
            match self.bounded(self.chain.transaction_receipt(tx_hash)).await {
                Ok(Some(r)) => return Ok(r),
                Ok(None) => {}
                Err(e) if e.is_transient() => debug!(error = %e, "receipt poll failed"),
                Err(e) => return Err(e),
            }
            if Instant::now() + self.cfg.receipt_poll() > deadline {
                return Err(ChainError::Timeout(self.cfg.receipt_timeout()));
            }
            sleep(self.cfg.receipt_poll()).await;
        }
    }

    fn record_submission(&self, job: &AnchorJob, tx_hash: &str, detail: &[u8; 32], amount: u64) -> LedgerResult<()> {
        let now = now_ms();
        self.store.update_chain_log(&job.transaction_id, |cur| {
            let Some(mut log) = cur else { return Ok(None) };
            if log.attempt_count != job.attempt {
                return Ok(None);
            }
            log.tx_hash         = Some(tx_hash.to_string());
            log.detail_hash     = Some(hex0x(detail));
            log.anchored_amount = Some(amount);
            log.updated_at_ms   = now;
            Ok(Some(log))
        })?;
        Ok(())
    }

    fn succeed(&self, job: &AnchorJob, tx_hash: String, receipt: Receipt) -> LedgerResult<Option<ChainLog>> {
        let now = now_ms();
        let updated = self.store.update_chain_log(&job.transaction_id, |cur| {
            let Some(mut log) = cur else { return Ok(None) };
            // the sweep may have marked this attempt failed meanwhile; a
            // receipt overrides that
            if log.attempt_count != job.attempt {
                return Ok(None);
            }
            log.status        = ChainStatus::Success;
            log.tx_hash       = Some(tx_hash.clone());
            log.block_number  = Some(receipt.block_number);
            log.error_detail  = None;
            log.retryable     = true;
            log.updated_at_ms = now;
            Ok(Some(log))
        })?;
        info!(tx_hash = %tx_hash, block = receipt.block_number, gas_used = receipt.gas_used, "anchor confirmed");
        Ok(updated)
    }
}

/// Drains the queue with at most `cfg.workers` attempts in flight.
pub async fn anchor_loop(worker: AnchorWorker, mut rx: mpsc::Receiver<AnchorJob>) -> anyhow::Result<()> {
    let permits = Arc::new(Semaphore::new(worker.cfg.workers.max(1)));
    info!(workers = worker.cfg.workers, "anchor writer started");

    while let Some(job) = rx.recv().await {
        let permit = permits.clone().acquire_owned().await?;
        let w = worker.clone();
        let span = info_span!(
            "anchor",
            treasury    = %job.treasury_id,
            transaction = %job.transaction_id,
            attempt     = job.attempt
        );
        tokio::spawn(
            async move {
                if let Err(e) = w.process(job).await {
                    error!(error = %e, "anchor bookkeeping failed");
                }
                drop(permit);
            }
            .instrument(span),
        );
    }

    info!("anchor queue closed, writer exiting");
    Ok(())
}
