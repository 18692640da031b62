//! Interval triggers for the close and deadline sweeps.
//!
//! Each trigger is a tokio task ticking at its configured period. A tick
//! hands the sweep to the blocking pool, since the engine talks to the
//! store synchronously. Ticks that fall due while a sweep is still running
//! are skipped, not queued.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use gavel_settlement::{SettlementEngine, SweepReport};
use gavel_types::{Result, SettlementError, SweepConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// The two periodic jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sweep {
    /// `ACTIVE` past end time → `ENDED`.
    Close,
    /// `ENDED` past winner deadline → forfeit.
    Deadline,
}

impl Sweep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Deadline => "deadline",
        }
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one sweep on the blocking pool against the current wall clock.
///
/// Takes no input beyond the engine and never fails: errors are logged and
/// reported as `None`, and the next tick retries.
pub async fn run_sweep(engine: Arc<SettlementEngine>, sweep: Sweep) -> Option<SweepReport> {
    let joined = tokio::task::spawn_blocking(move || {
        let now = Utc::now();
        match sweep {
            Sweep::Close => engine.close_due_auctions(now),
            Sweep::Deadline => engine.enforce_deadlines(now),
        }
    })
    .await;

    match joined {
        Ok(Ok(report)) => {
            if report.failed > 0 {
                warn!(%sweep, failed = report.failed, "sweep left auctions for the next tick");
            }
            Some(report)
        }
        Ok(Err(err)) => {
            error!(%sweep, code = err.code(), error = %err, "sweep query failed");
            None
        }
        Err(join_err) => {
            error!(%sweep, error = %join_err, "sweep task panicked");
            None
        }
    }
}

/// Completed-sweep counters, shared between the triggers and the handle.
#[derive(Debug, Default)]
struct Counters {
    close: AtomicU64,
    deadline: AtomicU64,
}

impl Counters {
    fn slot(&self, sweep: Sweep) -> &AtomicU64 {
        match sweep {
            Sweep::Close => &self.close,
            Sweep::Deadline => &self.deadline,
        }
    }
}

/// Builder for the two triggers.
pub struct SweepScheduler {
    engine: Arc<SettlementEngine>,
    close_every: Duration,
    deadline_every: Duration,
}

impl SweepScheduler {
    /// Triggers at the periods in the engine's configuration.
    #[must_use]
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        let sweeps = engine.config().sweeps;
        Self {
            engine,
            close_every: Duration::from_secs(sweeps.close_interval_secs),
            deadline_every: Duration::from_secs(sweeps.deadline_interval_secs),
        }
    }

    /// Override the periods.
    ///
    /// # Errors
    /// [`SettlementError::Configuration`] if either period is zero.
    pub fn with_intervals(mut self, sweeps: SweepConfig) -> Result<Self> {
        if sweeps.close_interval_secs == 0 || sweeps.deadline_interval_secs == 0 {
            return Err(SettlementError::Configuration(
                "sweep intervals must be positive".into(),
            ));
        }
        self.close_every = Duration::from_secs(sweeps.close_interval_secs);
        self.deadline_every = Duration::from_secs(sweeps.deadline_interval_secs);
        Ok(self)
    }

    /// Spawn both triggers on the current tokio runtime. The first tick of
    /// each fires immediately.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let tasks = [
            (Sweep::Close, self.close_every),
            (Sweep::Deadline, self.deadline_every),
        ]
        .into_iter()
        .map(|(sweep, period)| {
            tokio::spawn(trigger_loop(
                self.engine.clone(),
                sweep,
                period,
                counters.clone(),
                shutdown_rx.clone(),
            ))
        })
        .collect();

        info!(
            close_every_secs = self.close_every.as_secs(),
            deadline_every_secs = self.deadline_every.as_secs(),
            "sweep scheduler started"
        );
        SchedulerHandle {
            shutdown_tx,
            tasks,
            counters,
        }
    }
}

async fn trigger_loop(
    engine: Arc<SettlementEngine>,
    sweep: Sweep,
    period: Duration,
    counters: Arc<Counters>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(report) = run_sweep(engine.clone(), sweep).await {
                    debug!(%sweep, ?report, "tick done");
                }
                counters.slot(sweep).fetch_add(1, Ordering::Relaxed);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(%sweep, "trigger stopped");
}

/// Owns the running triggers.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl SchedulerHandle {
    /// Ticks of `sweep` that have finished, successful or not.
    #[must_use]
    pub fn completed(&self, sweep: Sweep) -> u64 {
        self.counters.slot(sweep).load(Ordering::Relaxed)
    }

    /// Stop both triggers and wait for them. A sweep already running is
    /// allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "trigger task ended abnormally");
            }
        }
        info!("sweep scheduler stopped");
    }
}
