//! Concurrent transfers: deadlock freedom and conservation of money

use std::time::Duration;
use transfer_ledger::{utils::MemoryStorage, Ledger, LedgerStorage, TransferTxParams};

const DEADLOCK_GUARD: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_directions_do_not_deadlock() {
    let storage = MemoryStorage::new();
    let a = storage.create_account("alice", "USD", 1_000).await.unwrap();
    let b = storage.create_account("bob", "USD", 1_000).await.unwrap();
    let ledger = Ledger::new(storage);

    let mut handles = Vec::new();
    for i in 0..20 {
        let ledger = ledger.clone();
        let params = if i % 2 == 0 {
            TransferTxParams::new(a.id, b.id, 10)
        } else {
            TransferTxParams::new(b.id, a.id, 10)
        };
        handles.push(tokio::spawn(async move { ledger.transfer_tx(params).await }));
    }

    let results = tokio::time::timeout(DEADLOCK_GUARD, futures::future::join_all(handles))
        .await
        .expect("concurrent transfers deadlocked");

    for result in results {
        let result = result.expect("transfer task panicked").unwrap();
        assert_eq!(result.transfer.amount, 10);
        assert_eq!(result.from_entry.amount + result.to_entry.amount, 0);
    }

    assert_eq!(ledger.get_account_required(a.id).await.unwrap().balance, 1_000);
    assert_eq!(ledger.get_account_required(b.id).await.unwrap().balance, 1_000);
    assert_eq!(ledger.list_transfers(None).await.unwrap().len(), 20);

    // Two opening entries plus two per transfer.
    assert_eq!(ledger.list_entries(None).await.unwrap().len(), 2 + 40);

    let report = ledger.validate_integrity().await.unwrap();
    assert!(report.is_valid, "{:?}", report.issues);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_direction_applies_every_debit() {
    let storage = MemoryStorage::new();
    let a = storage.create_account("alice", "USD", 1_000).await.unwrap();
    let b = storage.create_account("bob", "USD", 0).await.unwrap();
    let ledger = Ledger::new(storage);
    let (from, to) = (a.id, b.id);

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .transfer_tx(TransferTxParams::new(from, to, 4))
                    .await
            })
        })
        .collect();

    let results = tokio::time::timeout(DEADLOCK_GUARD, futures::future::join_all(handles))
        .await
        .expect("concurrent transfers deadlocked");

    let mut seen_balances: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().from_account.balance)
        .collect();
    seen_balances.sort_unstable();

    // Every transfer saw a distinct post-debit balance: no lost updates.
    let expected: Vec<i64> = (0..25).map(|k| 1_000 - 4 * (k + 1)).rev().collect();
    assert_eq!(seen_balances, expected);

    assert_eq!(ledger.get_account_required(a.id).await.unwrap().balance, 900);
    assert_eq!(ledger.get_account_required(b.id).await.unwrap().balance, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_money_is_conserved_across_account_pool() {
    let storage = MemoryStorage::new();
    let mut ids = Vec::new();
    for owner in ["a", "b", "c", "d", "e"] {
        ids.push(storage.create_account(owner, "USD", 500).await.unwrap().id);
    }
    let ledger = Ledger::new(storage);
    let initial_total: i64 = 5 * 500;

    let mut handles = Vec::new();
    for i in 0..100usize {
        let from = ids[i % ids.len()];
        let to = ids[(i * 3 + 1) % ids.len()];
        if from == to {
            continue;
        }
        let ledger = ledger.clone();
        let amount = (i % 7 + 1) as i64;
        handles.push(tokio::spawn(async move {
            ledger
                .transfer_tx(TransferTxParams::new(from, to, amount))
                .await
        }));
    }
    let spawned = handles.len();

    let results = tokio::time::timeout(DEADLOCK_GUARD, futures::future::join_all(handles))
        .await
        .expect("concurrent transfers deadlocked");
    assert!(results.into_iter().all(|r| r.unwrap().is_ok()));

    let accounts = ledger.list_accounts().await.unwrap();
    let final_total: i64 = accounts.iter().map(|a| a.balance).sum();
    assert_eq!(final_total, initial_total);

    let report = ledger.validate_integrity().await.unwrap();
    assert!(report.is_valid, "{:?}", report.issues);
    assert_eq!(report.transfers_checked, spawned);
    assert_eq!(report.total_balance, i128::from(initial_total));
}
