use crate::{
    error::LedgerResult,
    model::{Actor, BalanceSummary, Capability, TxKind, TxStatus},
    storage::LedgerStore,
    treasury::authorize,
};

use tracing::debug;
use uuid::Uuid;

/// Balance over confirmed transactions only, using the confirmed amount.
/// Pending, rejected and deleted records contribute nothing. Chain status
/// plays no part: an unanchored confirmation still counts.
#[derive(Clone)]
pub struct BalanceAggregator {
    store: LedgerStore,
}

impl BalanceAggregator {
    pub fn new(store: LedgerStore) -> Self {
        BalanceAggregator { store }
    }

    pub fn summary(&self, treasury_id: &Uuid, actor: &Actor) -> LedgerResult<BalanceSummary> {
        authorize(&self.store, treasury_id, actor, Capability::View)?;
        self.compute(treasury_id)
    }

    /// One prefix scan; every record read is a whole committed version, so a
    /// concurrent confirm is either fully in or fully out.
    pub fn compute(&self, treasury_id: &Uuid) -> LedgerResult<BalanceSummary> {
        let mut total_income: u128 = 0;
        let mut total_expense: u128 = 0;
        let mut confirmed_count = 0;

        for tx in self.store.transactions(treasury_id)? {
            if tx.status != TxStatus::Confirmed {
                continue;
            }
            let Some(amount) = tx.confirmed_amount else { continue };
            match tx.kind {
                TxKind::Income  => total_income += amount as u128,
                TxKind::Expense => total_expense += amount as u128,
            }
            confirmed_count += 1;
        }

        let balance = total_income as i128 - total_expense as i128;
        debug!(treasury = %treasury_id, confirmed_count, balance, "balance computed");
        Ok(BalanceSummary { treasury_id: *treasury_id, total_income, total_expense, balance, confirmed_count })
    }
}
