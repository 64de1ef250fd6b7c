//! In-process chain for local development and tests. Entries live in memory,
//! receipts are available immediately, and failures can be scripted.

use super::{abi::keccak256, Address, AnchorEntry, ChainClient, Receipt};
use crate::{error::ChainError, utils::hex0x};

use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

#[derive(Default)]
struct State {
    block:             u64,
    submissions:       u64,
    entries:           Vec<AnchorEntry>,
    receipts:          HashMap<String, Receipt>,
    counts:            HashMap<Address, u64>,
    scripted:          VecDeque<ChainError>,
    stalled:           bool,
    withhold_receipts: bool,
    revert_next:       bool,
}

#[derive(Default)]
pub struct MemoryChain {
    state: Mutex<State>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// Submissions hang until the caller's timeout fires.
    pub fn stall_submissions(&self, on: bool) {
        self.with(|s| s.stalled = on);
    }

    /// The next submission fails with `err` (queued, one per call).
    pub fn fail_next(&self, err: ChainError) {
        self.with(|s| s.scripted.push_back(err));
    }

    /// Receipts stay unavailable, as if nothing gets mined.
    pub fn withhold_receipts(&self, on: bool) {
        self.with(|s| s.withhold_receipts = on);
    }

    /// The next mined entry gets a failed (reverted) receipt.
    pub fn revert_next(&self) {
        self.with(|s| s.revert_next = true);
    }

    /// Calls that reached the chain, including failed ones.
    pub fn submissions(&self) -> u64 {
        self.with(|s| s.submissions)
    }

    /// Successfully mined entries, in order.
    pub fn entries(&self) -> Vec<AnchorEntry> {
        self.with(|s| s.entries.clone())
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn log_transaction(&self, entry: &AnchorEntry) -> Result<String, ChainError> {
        let stalled = self.with(|s| {
            s.submissions += 1;
            s.stalled
        });
        if stalled {
            std::future::pending::<()>().await;
        }

        self.with(|s| {
            if let Some(err) = s.scripted.pop_front() {
                return Err(err);
            }

            s.block += 1;
            let mut preimage = entry.detail_hash.to_vec();
            preimage.extend_from_slice(&s.submissions.to_be_bytes());
            let tx_hash = hex0x(&keccak256(&preimage));

            let success = !std::mem::take(&mut s.revert_next);
            if success {
                s.entries.push(entry.clone());
                *s.counts.entry(entry.treasury).or_default() += 1;
            }
            s.receipts.insert(tx_hash.clone(), Receipt {
                block_number: s.block,
                success,
                gas_used:     if success { 31_000 } else { 23_000 },
            });
            Ok(tx_hash)
        })
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, ChainError> {
        Ok(self.with(|s| {
            if s.withhold_receipts {
                None
            } else {
                s.receipts.get(tx_hash).copied()
            }
        }))
    }

    async fn treasury_log_count(&self, treasury: &Address) -> Result<u64, ChainError> {
        Ok(self.with(|s| s.counts.get(treasury).copied().unwrap_or(0)))
    }
}
