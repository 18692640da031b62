//! Ledger-plane integration tests: concurrent wallet moves against one
//! store, with the conservation audit as the oracle.

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use gavel_ledger::{
    ConservationAudit, Document, MemoryStore, Transaction, WalletLedger, run_transaction,
};
use gavel_types::{RetryPolicy, SettlementError, UserId, Wallet};
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

#[test]
fn concurrent_credits_all_land() {
    let store = Arc::new(MemoryStore::new());
    let user = UserId::new();
    let threads = 8;
    let per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ledger = WalletLedger::new(store.clone(), RetryPolicy::immediate(1_000));
            thread::spawn(move || {
                for _ in 0..per_thread {
                    ledger.credit_available(user, dec(1), Utc::now()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let audit = ConservationAudit::new(store.clone());
    let report = audit.verify_wallet(user).unwrap();
    assert_eq!(report.wallet_total, dec(threads * per_thread));
    assert_eq!(report.entries, usize::try_from(threads * per_thread).unwrap());
}

#[test]
fn racing_reservations_never_overcommit() {
    let store = Arc::new(MemoryStore::new());
    let user = UserId::new();
    let ledger = WalletLedger::new(store.clone(), RetryPolicy::immediate(1_000));
    ledger.credit_available(user, dec(100), Utc::now()).unwrap();

    // Ten reservers each want 30; only three can succeed.
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = WalletLedger::new(store.clone(), RetryPolicy::immediate(1_000));
            thread::spawn(move || ledger.reserve(user, dec(30), Utc::now()))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 3);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SettlementError::InsufficientFunds { .. }))
    );

    let wallet = ledger.balance(user).unwrap();
    assert_eq!(wallet.available, dec(10));
    assert_eq!(wallet.reserved, dec(90));
    ConservationAudit::new(store).verify_all().unwrap();
}

#[test]
fn audit_flags_untracked_balance_change() {
    let store = Arc::new(MemoryStore::new());
    let user = UserId::new();
    let ledger = WalletLedger::new(store.clone(), RetryPolicy::immediate(3));
    ledger.credit_available(user, dec(50), Utc::now()).unwrap();

    // Funds appearing outside the ledger operations.
    let mut wallet = Wallet::empty(user);
    wallet.available = dec(75);
    store.seed([Document::Wallet(wallet)]).unwrap();

    let err = ConservationAudit::new(store).verify_wallet(user).unwrap_err();
    assert!(matches!(err, SettlementError::ConsistencyViolation { .. }));
}

#[test]
fn multi_document_move_is_all_or_nothing() {
    let store = MemoryStore::new();
    let (a, b) = (UserId::new(), UserId::new());
    let policy = RetryPolicy::immediate(1);

    let result: Result<(), SettlementError> = run_transaction(&store, &policy, "pair", |tx| {
        let mut first = tx.wallet(a)?;
        first.available = dec(5);
        tx.put_wallet(first);
        let mut second = tx.wallet(b)?;
        second.reserve(dec(1))?;
        tx.put_wallet(second);
        Ok(())
    });
    assert!(matches!(result, Err(SettlementError::InsufficientFunds { .. })));
    assert!(!Transaction::new(&store).has_wallet(a).unwrap());
    assert_eq!(store.commit_count().unwrap(), 0);
}
