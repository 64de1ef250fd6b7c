mod common;

use common::harness;
use std::time::Duration;
use treasury_anchor::{
    error::LedgerError,
    model::{ChainStatus, TxKind, TxStatus},
};

#[tokio::test]
async fn income_round_trip_reaches_balance_and_chain() {
    let h = harness();
    let tx = h.propose(TxKind::Income, 500_000);
    assert_eq!(h.balance(), 0);

    h.confirm(&tx, 500_000);
    assert_eq!(h.balance(), 500_000);

    let log = h.settled(&tx.id).await;
    assert_eq!(log.status, ChainStatus::Success);
    assert_eq!(log.attempt_count, 1);
    assert_eq!(log.anchored_amount, Some(500_000));
    assert_eq!(h.chain.entries().len(), 1);
}

#[tokio::test]
async fn reject_leaves_balance_and_chain_untouched() {
    let h = harness();
    let tx = h.propose(TxKind::Income, 500_000);
    h.state.ledger.reject(&h.treasury, &tx.id, &h.admin, "not ours").unwrap();

    assert_eq!(h.balance(), 0);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.chain.submissions(), 0);
    assert_eq!(h.state.store.chain_log(&tx.id).unwrap().unwrap().status, ChainStatus::None);
}

#[tokio::test]
async fn adjusted_expense_counts_confirmed_amount() {
    let h = harness();
    let seed = h.propose(TxKind::Income, 1_000_000);
    h.confirm(&seed, 1_000_000);

    let tx = h.propose(TxKind::Expense, 200_000);
    h.confirm(&tx, 180_000);
    assert_eq!(h.balance(), 820_000);

    h.settled(&tx.id).await;
    let entry = h.chain.entries().into_iter().find(|e| !e.is_income).unwrap();
    assert_eq!(entry.amount, 180_000);
}

#[tokio::test]
async fn double_confirm_never_writes_twice() {
    let h = harness();
    let tx = h.propose(TxKind::Income, 10);
    h.confirm(&tx, 10);
    h.settled(&tx.id).await;

    let err = h.state.ledger.confirm(&h.treasury, &tx.id, &h.admin, 10, None, None).unwrap_err();
    assert!(matches!(err, LedgerError::State(_)));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.chain.submissions(), 1);
    assert_eq!(h.settled(&tx.id).await.attempt_count, 1);
}

#[tokio::test]
async fn timeout_then_manual_retry_succeeds() {
    let h = harness();
    h.chain.stall_submissions(true);
    let tx = h.propose(TxKind::Expense, 75);
    h.confirm(&tx, 75);

    let log = h.settled(&tx.id).await;
    assert_eq!(log.status, ChainStatus::Failed);
    assert_eq!(log.attempt_count, 1);
    assert!(log.retryable);
    assert!(log.error_detail.is_some());
    // the ledger side is unaffected
    assert_eq!(h.balance(), -75);

    h.chain.stall_submissions(false);
    let log = h.state.retry.retry(&h.treasury, &tx.id, &h.treasurer).unwrap();
    assert_eq!(log.status, ChainStatus::Pending);
    assert_eq!(log.attempt_count, 2);

    let log = h.settled(&tx.id).await;
    assert_eq!(log.status, ChainStatus::Success);
    assert!(log.tx_hash.is_some());
    assert_eq!(log.error_detail, None);
}

#[tokio::test]
async fn retry_rejected_while_write_in_flight() {
    let h = harness();
    h.chain.withhold_receipts(true);
    let tx = h.propose(TxKind::Income, 5);
    h.confirm(&tx, 5);

    let err = h.state.retry.retry(&h.treasury, &tx.id, &h.admin).unwrap_err();
    assert!(matches!(err, LedgerError::State(_)));

    let log = h.settled(&tx.id).await;
    assert_eq!(log.status, ChainStatus::Failed);
    h.chain.withhold_receipts(false);

    // the earlier submission is found mined on the retry, nothing resent
    h.state.retry.retry(&h.treasury, &tx.id, &h.admin).unwrap();
    let log = h.settled(&tx.id).await;
    assert_eq!(log.status, ChainStatus::Success);
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn sweep_picks_up_transient_failures() {
    let h = harness();
    h.chain.fail_next(treasury_anchor::error::ChainError::Unavailable("node restarting".into()));
    let tx = h.propose(TxKind::Income, 9);
    h.confirm(&tx, 9);

    let failed = h.settled(&tx.id).await;
    assert_eq!(failed.status, ChainStatus::Failed);

    let last = failed.last_attempt_at_ms.unwrap();
    let report = h.state.retry.sweep_at(last + 50).unwrap();
    assert_eq!(report.requeued, 1);

    let log = h.settled(&tx.id).await;
    assert_eq!(log.status, ChainStatus::Success);
    assert_eq!(log.attempt_count, 2);
}

#[tokio::test]
async fn soft_delete_keeps_anchor_record() {
    let h = harness();
    let keep = h.propose(TxKind::Income, 300);
    let gone = h.propose(TxKind::Income, 200);
    h.confirm(&keep, 300);
    h.confirm(&gone, 200);
    let anchored = h.settled(&gone.id).await;
    assert_eq!(anchored.status, ChainStatus::Success);
    assert_eq!(h.balance(), 500);

    let deleted = h.state.ledger.soft_delete(&h.treasury, &gone.id, &h.admin).unwrap();
    assert_eq!(deleted.status, TxStatus::Deleted);
    assert_eq!(h.balance(), 300);

    let after = h.state.store.chain_log(&gone.id).unwrap().unwrap();
    assert_eq!(after.status, ChainStatus::Success);
    assert_eq!(after.tx_hash, anchored.tx_hash);
    assert_eq!(after.anchored_amount, Some(200));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_decisions_resolve_to_one_outcome() {
    let h = harness();
    let txs: Vec<_> = (0..16).map(|i| h.propose(TxKind::Income, 100 + i)).collect();

    let mut tasks = Vec::new();
    for tx in &txs {
        let (ledger, t, id, amount) = (h.state.ledger.clone(), h.treasury, tx.id, tx.amount as i64);
        let (treasurer, admin) = (h.treasurer, h.admin);
        let confirm = {
            let ledger = ledger.clone();
            tokio::task::spawn_blocking(move || ledger.confirm(&t, &id, &treasurer, amount, None, None))
        };
        let reject = tokio::task::spawn_blocking(move || ledger.reject(&t, &id, &admin, "race"));
        tasks.push((confirm, reject));
    }

    let mut expected = 0i128;
    let mut confirmed = Vec::new();
    for ((confirm, reject), tx) in tasks.into_iter().zip(&txs) {
        let (c, r) = (confirm.await.unwrap(), reject.await.unwrap());
        match (c, r) {
            (Ok(done), Err(LedgerError::State(_))) => {
                expected += done.confirmed_amount.unwrap() as i128;
                confirmed.push(tx.id);
            }
            (Err(LedgerError::State(_)), Ok(rejected)) => assert_eq!(rejected.status, TxStatus::Rejected),
            other => panic!("both or neither won: {other:?}"),
        }
    }

    for id in &confirmed {
        assert_eq!(h.settled(id).await.status, ChainStatus::Success);
    }
    assert_eq!(h.balance(), expected);
    assert_eq!(h.chain.submissions(), confirmed.len() as u64);
}
