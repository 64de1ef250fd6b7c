//! Transaction state machine.
//!
//! ```text
//! pending ──confirm──▶ confirmed ──soft_delete──▶ deleted
//!    └────reject────▶ rejected
//! ```
//!
//! Every transition is a compare-and-swap on the stored record with the
//! precondition re-checked on each round, so of two racing decisions on one
//! transaction exactly one lands and the other sees a StateError. Only this
//! module writes Transaction records; chain logs belong to the anchor writer
//! and the retry manager.

use crate::{
    anchor::{AnchorWriter, Enqueue},
    config::ConfirmPolicy,
    error::{LedgerError, LedgerResult},
    model::{Actor, Capability, ChainLog, Transaction, TxKind, TxStatus},
    storage::LedgerStore,
    treasury::authorize,
    utils::now_ms,
};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub kind:   TxKind,
    pub amount: i64,
    pub note:   Option<String>,
}

/// Which transactions `list` returns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    NotDeleted,
    All,
    Only(Vec<TxStatus>),
}

impl StatusFilter {
    /// `None`/empty -> default, `all`, or a comma separated status list.
    pub fn parse(raw: Option<&str>) -> LedgerResult<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(StatusFilter::NotDeleted),
            Some("all") => Ok(StatusFilter::All),
            Some(list) => list
                .split(',')
                .map(|s| {
                    TxStatus::parse(s.trim())
                        .ok_or_else(|| LedgerError::validation(format!("unknown status `{}`", s.trim())))
                })
                .collect::<LedgerResult<Vec<_>>>()
                .map(StatusFilter::Only),
        }
    }

    fn matches(&self, status: TxStatus) -> bool {
        match self {
            StatusFilter::NotDeleted => status != TxStatus::Deleted,
            StatusFilter::All        => true,
            StatusFilter::Only(set)  => set.contains(&status),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub chain_log:   Option<ChainLog>,
}

fn positive(value: i64, field: &str) -> LedgerResult<u64> {
    if value <= 0 {
        return Err(LedgerError::validation(format!("{field} must be greater than zero")));
    }
    Ok(value as u64)
}

fn clean(text: Option<String>) -> Option<String> {
    text.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct Ledger {
    store:  LedgerStore,
    anchor: AnchorWriter,
    policy: ConfirmPolicy,
}

impl Ledger {
    pub fn new(store: LedgerStore, anchor: AnchorWriter, policy: ConfirmPolicy) -> Self {
        Ledger { store, anchor, policy }
    }

    pub fn create(&self, treasury_id: &Uuid, actor: &Actor, req: NewTransaction) -> LedgerResult<Transaction> {
        authorize(&self.store, treasury_id, actor, Capability::Propose)?;
        let amount = positive(req.amount, "amount")?;

        let now = now_ms();
        let tx = Transaction {
            id:                  Uuid::new_v4(),
            treasury_id:         *treasury_id,
            kind:                req.kind,
            amount,
            note:                clean(req.note),
            status:              TxStatus::Pending,
            confirmed_amount:    None,
            created_by:          actor.user_id,
            created_at_ms:       now,
            decided_by:          None,
            decided_at_ms:       None,
            decision_note:       None,
            decision_request_id: None,
            reject_reason:       None,
            deleted_by:          None,
            deleted_at_ms:       None,
        };
        self.store.insert_transaction(&tx, &ChainLog::new(tx.treasury_id, tx.id, now))?;

        info!(treasury = %treasury_id, transaction = %tx.id, kind = tx.kind.as_str(), amount, "transaction proposed");
        Ok(tx)
    }

    /// Creator edits a proposal before anyone decides on it.
    pub fn amend(
        &self,
        treasury_id: &Uuid,
        tx_id: &Uuid,
        actor: &Actor,
        amount: i64,
        note: Option<String>,
    ) -> LedgerResult<Transaction> {
        authorize(&self.store, treasury_id, actor, Capability::Propose)?;
        let amount = positive(amount, "amount")?;
        let note = clean(note);

        let tx = self.store.update_transaction(treasury_id, tx_id, |mut tx| {
            if tx.created_by != actor.user_id {
                return Err(LedgerError::Authorization("only the creator can amend a transaction".into()));
            }
            if tx.status != TxStatus::Pending {
                return Err(LedgerError::state(format!("transaction is {:?}; only pending transactions can be amended", tx.status)));
            }
            tx.amount = amount;
            tx.note = note.clone();
            Ok(tx)
        })?;

        info!(treasury = %treasury_id, transaction = %tx_id, amount, "transaction amended");
        Ok(tx)
    }

    /// Confirms a pending transaction and queues its anchor write.
    ///
    /// A repeat of the same confirm (same `request_id`, same actor) returns the
    /// stored result and queues nothing; any other confirm of a non-pending
    /// transaction is a StateError.
    pub fn confirm(
        &self,
        treasury_id: &Uuid,
        tx_id: &Uuid,
        actor: &Actor,
        confirmed_amount: i64,
        note: Option<String>,
        request_id: Option<Uuid>,
    ) -> LedgerResult<Transaction> {
        authorize(&self.store, treasury_id, actor, Capability::Decide)?;
        let confirmed = positive(confirmed_amount, "confirmed_amount")?;
        let note = clean(note);

        let mut replay = false;
        let tx = self.store.update_transaction(treasury_id, tx_id, |mut tx| {
            replay = false;
            if tx.status != TxStatus::Pending {
                let same_request = request_id.is_some()
                    && tx.status == TxStatus::Confirmed
                    && tx.decision_request_id == request_id
                    && tx.decided_by == Some(actor.user_id);
                if same_request {
                    replay = true;
                    return Ok(tx);
                }
                return Err(LedgerError::state(format!(
                    "transaction is {:?}; only pending transactions can be confirmed",
                    tx.status
                )));
            }
            self.check_divergence(tx.amount, confirmed, note.as_deref())?;

            tx.status              = TxStatus::Confirmed;
            tx.confirmed_amount    = Some(confirmed);
            tx.decided_by          = Some(actor.user_id);
            tx.decided_at_ms       = Some(now_ms());
            tx.decision_note       = note.clone();
            tx.decision_request_id = request_id;
            Ok(tx)
        })?;

        if replay {
            debug!(transaction = %tx_id, "confirm replayed, nothing queued");
            return Ok(tx);
        }
        info!(
            treasury = %treasury_id,
            transaction = %tx_id,
            proposed = tx.amount,
            confirmed,
            "transaction confirmed"
        );

        // anchoring trouble never fails the confirm; the sweep re-queues
        match self.anchor.enqueue(treasury_id, tx_id) {
            Ok(Enqueue::Queued(_)) => {}
            Ok(other) => debug!(transaction = %tx_id, outcome = ?other, "anchor not queued"),
            Err(e) => warn!(transaction = %tx_id, error = %e, "anchor enqueue failed; left for the sweep"),
        }
        Ok(tx)
    }

    pub fn reject(&self, treasury_id: &Uuid, tx_id: &Uuid, actor: &Actor, reason: &str) -> LedgerResult<Transaction> {
        authorize(&self.store, treasury_id, actor, Capability::Decide)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::validation("a rejection reason is required"));
        }

        let tx = self.store.update_transaction(treasury_id, tx_id, |mut tx| {
            if tx.status != TxStatus::Pending {
                return Err(LedgerError::state(format!(
                    "transaction is {:?}; only pending transactions can be rejected",
                    tx.status
                )));
            }
            tx.status        = TxStatus::Rejected;
            tx.reject_reason = Some(reason.to_string());
            tx.decided_by    = Some(actor.user_id);
            tx.decided_at_ms = Some(now_ms());
            Ok(tx)
        })?;

        info!(treasury = %treasury_id, transaction = %tx_id, reason, "transaction rejected");
        Ok(tx)
    }

    /// Local-only removal of a confirmed transaction from the balance. The
    /// chain log and any on-chain entry stay as they are.
    pub fn soft_delete(&self, treasury_id: &Uuid, tx_id: &Uuid, actor: &Actor) -> LedgerResult<Transaction> {
        authorize(&self.store, treasury_id, actor, Capability::Delete)?;

        let mut removed_amount = None;
        let tx = self.store.update_transaction(treasury_id, tx_id, |mut tx| {
            if tx.status != TxStatus::Confirmed {
                return Err(LedgerError::state(format!(
                    "transaction is {:?}; only confirmed transactions can be deleted",
                    tx.status
                )));
            }
            removed_amount = tx.confirmed_amount.take();
            tx.status        = TxStatus::Deleted;
            tx.deleted_by    = Some(actor.user_id);
            tx.deleted_at_ms = Some(now_ms());
            Ok(tx)
        })?;

        info!(treasury = %treasury_id, transaction = %tx_id, confirmed_amount = ?removed_amount, "transaction deleted");
        Ok(tx)
    }

    pub fn get(&self, treasury_id: &Uuid, tx_id: &Uuid, actor: &Actor) -> LedgerResult<TransactionView> {
        authorize(&self.store, treasury_id, actor, Capability::View)?;
        let transaction = self.store
            .transaction(treasury_id, tx_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))?;
        let chain_log = self.store.chain_log(tx_id)?;
        Ok(TransactionView { transaction, chain_log })
    }

    /// Newest first.
    pub fn list(&self, treasury_id: &Uuid, actor: &Actor, filter: &StatusFilter) -> LedgerResult<Vec<TransactionView>> {
        authorize(&self.store, treasury_id, actor, Capability::View)?;

        let mut txs: Vec<Transaction> = self.store
            .transactions(treasury_id)?
            .into_iter()
            .filter(|t| filter.matches(t.status))
            .collect();
        txs.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));

        txs.into_iter()
            .map(|transaction| {
                let chain_log = self.store.chain_log(&transaction.id)?;
                Ok(TransactionView { transaction, chain_log })
            })
            .collect()
    }

    fn check_divergence(&self, proposed: u64, confirmed: u64, note: Option<&str>) -> LedgerResult<()> {
        let Some(bps) = self.policy.justification_threshold_bps else {
            return Ok(());
        };
        let diff = proposed.abs_diff(confirmed) as u128;
        if diff * 10_000 > bps as u128 * proposed as u128 && note.is_none() {
            return Err(LedgerError::validation(format!(
                "confirmed amount {confirmed} differs from proposed {proposed} by more than {bps} bps; a note is required"
            )));
        }
        Ok(())
    }
}
