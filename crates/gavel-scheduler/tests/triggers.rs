//! Sweep triggers against an in-memory engine, on tokio's paused clock.
//!
//! Auctions are stamped relative to the wall clock because the sweeps read
//! `Utc::now()`; the tokio clock only drives the tick cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gavel_ledger::{Document, MemoryStore, Transaction};
use gavel_scheduler::{SchedulerHandle, Sweep, SweepScheduler, run_sweep};
use gavel_settlement::{InMemoryGateway, SettlementEngine};
use gavel_types::{
    Auction, AuctionId, AuctionState, RetryPolicy, SettlementConfig, SweepConfig, UserId,
    WebhookConfig,
};
use rust_decimal::Decimal;

fn engine(store: &Arc<MemoryStore>) -> Arc<SettlementEngine> {
    let config = SettlementConfig {
        retry: RetryPolicy::immediate(8),
        webhook: WebhookConfig {
            signing_secret: "whsec_scheduler".into(),
            tolerance_secs: 300,
        },
        sweeps: SweepConfig {
            close_interval_secs: 60,
            deadline_interval_secs: 120,
        },
        ..SettlementConfig::default()
    };
    let engine = SettlementEngine::new(store.clone(), Arc::new(InMemoryGateway::new()), config)
        .expect("valid config");
    Arc::new(engine)
}

fn seed_auction(store: &MemoryStore, ended_ago: chrono::Duration) -> AuctionId {
    let auction = Auction::dummy_active(
        Decimal::new(2_000, 0),
        Some(UserId::new()),
        Utc::now() - ended_ago,
    );
    let id = auction.id;
    store.seed([Document::Auction(auction)]).unwrap();
    id
}

fn state(store: &MemoryStore, id: AuctionId) -> AuctionState {
    Transaction::new(store).require_auction(id).unwrap().state
}

async fn wait_for(handle: &SchedulerHandle, sweep: Sweep, ticks: u64) {
    for _ in 0..1_000 {
        if handle.completed(sweep) >= ticks {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("{sweep} sweep did not reach {ticks} ticks");
}

#[tokio::test]
async fn run_sweep_closes_due_auction_once() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store);
    let id = seed_auction(&store, chrono::Duration::minutes(1));

    let first = run_sweep(engine.clone(), Sweep::Close).await.unwrap();
    assert_eq!((first.examined, first.advanced), (1, 1));
    assert_eq!(state(&store, id), AuctionState::Ended);

    let second = run_sweep(engine, Sweep::Close).await.unwrap();
    assert_eq!(second.examined, 0);
}

#[tokio::test]
async fn deadline_sweep_ignores_fresh_close() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&store);
    let id = seed_auction(&store, chrono::Duration::minutes(1));

    run_sweep(engine.clone(), Sweep::Close).await.unwrap();
    let report = run_sweep(engine, Sweep::Deadline).await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(state(&store, id), AuctionState::Ended);
}

#[tokio::test(start_paused = true)]
async fn triggers_close_then_forfeit_on_their_own() {
    let store = Arc::new(MemoryStore::new());
    // Ended long enough ago that its winner deadline has already passed.
    let id = seed_auction(&store, chrono::Duration::hours(49));

    let handle = SweepScheduler::new(engine(&store)).start();
    wait_for(&handle, Sweep::Close, 1).await;
    assert_ne!(state(&store, id), AuctionState::Active);

    // Past the second deadline tick.
    tokio::time::sleep(Duration::from_secs(121)).await;
    wait_for(&handle, Sweep::Deadline, 2).await;
    assert!(handle.completed(Sweep::Close) >= 3);
    assert_eq!(state(&store, id), AuctionState::EndedNoResponse);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn nothing_runs_after_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let handle = SweepScheduler::new(engine(&store)).start();
    wait_for(&handle, Sweep::Close, 1).await;
    handle.shutdown().await;

    let id = seed_auction(&store, chrono::Duration::minutes(1));
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(state(&store, id), AuctionState::Active);
}

#[test]
fn zero_interval_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let result = SweepScheduler::new(engine(&store)).with_intervals(SweepConfig {
        close_interval_secs: 0,
        deadline_interval_secs: 60,
    });
    assert!(result.is_err());
}
