use crate::{
    error::{LedgerError, LedgerResult},
    model::{ChainLog, Member, Transaction, Treasury},
};

use anyhow::Context;
use bincode::{
    config::standard,
    serde::{decode_from_slice, encode_to_vec},
};
use serde::{de::DeserializeOwned, Serialize};
use sled::{
    transaction::{ConflictableTransactionError, TransactionError},
    Db, Transactional, Tree,
};
use tracing::debug;
use uuid::Uuid;

const TREASURIES:   &str = "treasuries";    // treasury_id -> Treasury
const MEMBERS:      &str = "members";       // treasury_id ++ user_id -> Member
const TRANSACTIONS: &str = "transactions";  // treasury_id ++ tx_id -> Transaction
const CHAIN_LOGS:   &str = "chain_logs";    // tx_id -> ChainLog

fn encode<T: Serialize>(v: &T) -> LedgerResult<Vec<u8>> {
    Ok(encode_to_vec(v, standard())?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    let (v, _) = decode_from_slice(bytes, standard())?;
    Ok(v)
}

fn pair_key(a: &Uuid, b: &Uuid) -> [u8; 32] {
    let mut k = [0u8; 32];
    k[..16].copy_from_slice(a.as_bytes());
    k[16..].copy_from_slice(b.as_bytes());
    k
}

/// Read-modify-write with compare-and-swap on the raw bytes. `f` sees the
/// freshest record on every round, so its checks are re-run after a lost
/// race. Returning `Ok(None)` leaves the record untouched.
fn cas_update<T, F>(tree: &Tree, key: &[u8], mut f: F) -> LedgerResult<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> LedgerResult<Option<T>>,
{
    loop {
        let old = tree.get(key)?;
        let current = old.as_deref().map(decode::<T>).transpose()?;

        let Some(next) = f(current)? else {
            return Ok(None);
        };

        match tree.compare_and_swap(key, old.as_deref(), Some(encode(&next)?))? {
            Ok(()) => return Ok(Some(next)),
            Err(_) => {
                debug!(key = %hex::encode(key), "compare-and-swap lost, re-reading");
            }
        }
    }
}

fn scan<T: DeserializeOwned>(tree: &Tree, prefix: &[u8]) -> LedgerResult<Vec<T>> {
    let mut out = Vec::new();
    for item in tree.scan_prefix(prefix) {
        let (_k, v) = item?;
        out.push(decode(&v)?);
    }
    Ok(out)
}

/// Durable home of treasuries, members, transactions and chain logs.
#[derive(Clone)]
pub struct LedgerStore {
    db:           Db,
    treasuries:   Tree,
    members:      Tree,
    transactions: Tree,
    chain_logs:   Tree,
}

impl LedgerStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("opening sled db at `{}`", path))?;
        Self::from_db(db)
    }

    /// Throwaway database, removed on drop.
    pub fn temporary() -> anyhow::Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("opening temporary sled db")?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> anyhow::Result<Self> {
        let tree = |name: &str| {
            db.open_tree(name)
                .with_context(|| format!("opening sled tree `{}`", name))
        };
        Ok(LedgerStore {
            treasuries:   tree(TREASURIES)?,
            members:      tree(MEMBERS)?,
            transactions: tree(TRANSACTIONS)?,
            chain_logs:   tree(CHAIN_LOGS)?,
            db,
        })
    }

    pub async fn flush(&self) -> LedgerResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // treasuries & members
    // ------------------------------------------------------------------

    /// Treasury plus its creator's admin membership, atomically.
    pub fn insert_treasury(&self, treasury: &Treasury, creator: &Member) -> LedgerResult<()> {
        let t_key = treasury.id.into_bytes();
        let m_key = pair_key(&creator.treasury_id, &creator.user_id);
        let t_val = encode(treasury)?;
        let m_val = encode(creator)?;

        (&self.treasuries, &self.members)
            .transaction(|(treasuries, members)| {
                if treasuries.get(&t_key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                treasuries.insert(&t_key[..], t_val.clone())?;
                members.insert(&m_key[..], m_val.clone())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Abort(()) => LedgerError::state("treasury id already exists"),
                TransactionError::Storage(e) => e.into(),
            })?;

        debug!(treasury = %treasury.id, "treasury stored");
        Ok(())
    }

    pub fn treasury(&self, id: &Uuid) -> LedgerResult<Option<Treasury>> {
        self.treasuries
            .get(id.as_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    pub fn put_member(&self, member: &Member) -> LedgerResult<()> {
        self.members
            .insert(pair_key(&member.treasury_id, &member.user_id), encode(member)?)?;
        Ok(())
    }

    pub fn member(&self, treasury_id: &Uuid, user_id: &Uuid) -> LedgerResult<Option<Member>> {
        self.members
            .get(pair_key(treasury_id, user_id))?
            .map(|v| decode(&v))
            .transpose()
    }

    pub fn members(&self, treasury_id: &Uuid) -> LedgerResult<Vec<Member>> {
        scan(&self.members, treasury_id.as_bytes())
    }

    // ------------------------------------------------------------------
    // transactions
    // ------------------------------------------------------------------

    /// Transaction and its `none` chain log, atomically.
    pub fn insert_transaction(&self, tx: &Transaction, log: &ChainLog) -> LedgerResult<()> {
        let tx_key  = pair_key(&tx.treasury_id, &tx.id);
        let log_key = log.transaction_id.into_bytes();
        let tx_val  = encode(tx)?;
        let log_val = encode(log)?;

        (&self.transactions, &self.chain_logs)
            .transaction(|(txs, logs)| {
                if txs.get(&tx_key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                txs.insert(&tx_key[..], tx_val.clone())?;
                logs.insert(&log_key[..], log_val.clone())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Abort(()) => LedgerError::state("transaction id already exists"),
                TransactionError::Storage(e) => e.into(),
            })
    }

    pub fn transaction(&self, treasury_id: &Uuid, tx_id: &Uuid) -> LedgerResult<Option<Transaction>> {
        self.transactions
            .get(pair_key(treasury_id, tx_id))?
            .map(|v| decode(&v))
            .transpose()
    }

    /// Every transaction of a treasury, one pass over its key prefix.
    pub fn transactions(&self, treasury_id: &Uuid) -> LedgerResult<Vec<Transaction>> {
        scan(&self.transactions, treasury_id.as_bytes())
    }

    /// Applies `f` to the current record under optimistic concurrency.
    /// Fails with NotFound when the transaction does not exist.
    pub fn update_transaction<F>(&self, treasury_id: &Uuid, tx_id: &Uuid, mut f: F) -> LedgerResult<Transaction>
    where
        F: FnMut(Transaction) -> LedgerResult<Transaction>,
    {
        let updated = cas_update(&self.transactions, &pair_key(treasury_id, tx_id), |cur| {
            let tx = cur.ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))?;
            f(tx).map(Some)
        })?;
        updated.ok_or_else(|| LedgerError::NotFound(format!("transaction {tx_id}")))
    }

    // ------------------------------------------------------------------
    // chain logs
    // ------------------------------------------------------------------

    pub fn chain_log(&self, tx_id: &Uuid) -> LedgerResult<Option<ChainLog>> {
        self.chain_logs
            .get(tx_id.as_bytes())?
            .map(|v| decode(&v))
            .transpose()
    }

    pub fn chain_logs(&self) -> LedgerResult<Vec<ChainLog>> {
        scan(&self.chain_logs, &[])
    }

    /// Conditional chain-log mutation; `Ok(None)` from `f` means "leave it".
    /// This is the per-transaction exclusive section for anchor writes.
    pub fn update_chain_log<F>(&self, tx_id: &Uuid, f: F) -> LedgerResult<Option<ChainLog>>
    where
        F: FnMut(Option<ChainLog>) -> LedgerResult<Option<ChainLog>>,
    {
        cas_update(&self.chain_logs, tx_id.as_bytes(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChainStatus, TxKind, TxStatus};
    use std::sync::{Arc, Barrier};

    fn pending_tx(treasury_id: Uuid) -> Transaction {
        Transaction {
            id:                  Uuid::new_v4(),
            treasury_id,
            kind:                TxKind::Income,
            amount:              10,
            note:                None,
            status:              TxStatus::Pending,
            confirmed_amount:    None,
            created_by:          Uuid::new_v4(),
            created_at_ms:       1,
            decided_by:          None,
            decided_at_ms:       None,
            decision_note:       None,
            decision_request_id: None,
            reject_reason:       None,
            deleted_by:          None,
            deleted_at_ms:       None,
        }
    }

    #[test]
    fn insert_creates_none_chain_log() {
        let store = LedgerStore::temporary().unwrap();
        let tx = pending_tx(Uuid::new_v4());
        store.insert_transaction(&tx, &ChainLog::new(tx.treasury_id, tx.id, 1)).unwrap();

        assert_eq!(store.transaction(&tx.treasury_id, &tx.id).unwrap(), Some(tx.clone()));
        let log = store.chain_log(&tx.id).unwrap().unwrap();
        assert_eq!(log.status, ChainStatus::None);
        assert_eq!(log.attempt_count, 0);

        let dup = store.insert_transaction(&tx, &ChainLog::new(tx.treasury_id, tx.id, 1));
        assert!(matches!(dup, Err(LedgerError::State(_))));
    }

    #[test]
    fn scans_are_scoped_to_treasury() {
        let store = LedgerStore::temporary().unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for t in [a, a, b] {
            let tx = pending_tx(t);
            store.insert_transaction(&tx, &ChainLog::new(t, tx.id, 1)).unwrap();
        }
        assert_eq!(store.transactions(&a).unwrap().len(), 2);
        assert_eq!(store.transactions(&b).unwrap().len(), 1);
        assert_eq!(store.chain_logs().unwrap().len(), 3);
    }

    #[test]
    fn missing_transaction_update_is_not_found() {
        let store = LedgerStore::temporary().unwrap();
        let err = store
            .update_transaction(&Uuid::new_v4(), &Uuid::new_v4(), Ok)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn concurrent_cas_has_single_winner() {
        let store = LedgerStore::temporary().unwrap();
        let tx = pending_tx(Uuid::new_v4());
        store.insert_transaction(&tx, &ChainLog::new(tx.treasury_id, tx.id, 1)).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                let (t, id) = (tx.treasury_id, tx.id);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.update_transaction(&t, &id, |mut cur| {
                        if cur.status != TxStatus::Pending {
                            return Err(LedgerError::state("already decided"));
                        }
                        cur.status = TxStatus::Rejected;
                        Ok(cur)
                    })
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(wins, 1);
    }
}
