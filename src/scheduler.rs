//! Periodic analysis
//!
//! Runs the analysis cycle on a fixed cadence for an engine shared behind a
//! mutex. The task is bound to a [`CancellationToken`]; ticks missed while the
//! host was suspended collapse into one.

use crate::analytics::engine::{AnalysisOutcome, AnalyticsEngine};
use crate::store::KeyValueStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep, bounding how long cancellation takes to be noticed
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Engine shared between the UI callbacks and the periodic task
pub type SharedEngine<S> = Arc<Mutex<AnalyticsEngine<S>>>;

/// Cooperative cancellation flag tied to the application lifecycle
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tick bookkeeping for a fixed cadence.
///
/// After a tick fires, the next one is due a full interval after the moment it
/// fired, so a long stall yields one tick rather than a backlog.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    interval: Duration,
    next_due: Instant,
}

impl TickSchedule {
    /// First tick one interval after `start`
    pub fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next_due: start + interval,
        }
    }

    /// Whether a tick is due at `now`; advances the schedule when it is
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }

    /// Time left until the next tick (zero when overdue)
    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }
}

fn lock<S: KeyValueStore>(engine: &SharedEngine<S>) -> MutexGuard<'_, AnalyticsEngine<S>> {
    match engine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Analytics engine lock was poisoned; continuing");
            poisoned.into_inner()
        }
    }
}

/// Run one cycle on a shared engine.
///
/// The snapshot is taken under the lock, analyzed without it, and published
/// under the lock again, so interactions keep flowing during the computation.
pub fn run_cycle<S: KeyValueStore>(engine: &SharedEngine<S>) -> AnalysisOutcome {
    let (snapshot, analyzer) = {
        let mut guard = lock(engine);
        let now = guard.now();
        let Some(snapshot) = guard.begin_analysis(now) else {
            return AnalysisOutcome::Coalesced;
        };
        (snapshot, guard.analyzer().clone())
    };

    let pattern = snapshot.analyze(&analyzer);

    lock(engine).finish_analysis(&snapshot, pattern)
}

/// Background task running [`run_cycle`] on a fixed cadence
#[derive(Debug)]
pub struct PeriodicAnalysis {
    token: CancellationToken,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicAnalysis {
    /// Start the task at the engine's configured `analysis_interval_secs`
    pub fn spawn_configured<S>(engine: SharedEngine<S>) -> Self
    where
        S: KeyValueStore + Send + 'static,
    {
        let interval = lock(&engine).config().analysis_interval();
        Self::spawn(engine, interval)
    }

    /// Start the task; the first cycle runs one interval from now
    pub fn spawn<S>(engine: SharedEngine<S>, interval: Duration) -> Self
    where
        S: KeyValueStore + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = thread::spawn(move || {
            let mut schedule = TickSchedule::starting_at(Instant::now(), interval);
            log::debug!("Periodic analysis started (every {:?})", interval);

            while !task_token.is_cancelled() {
                if schedule.poll(Instant::now()) {
                    let outcome = run_cycle(&engine);
                    log::debug!("Periodic analysis cycle: {:?}", outcome);
                }
                thread::sleep(schedule.time_until_due(Instant::now()).min(POLL_SLICE));
            }

            log::debug!("Periodic analysis stopped");
        });

        Self {
            token,
            interval,
            handle: Some(handle),
        }
    }

    /// Cadence the task runs at
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Token that stops the task when cancelled
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel and wait for the in-flight cycle, if any, to finish
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Periodic analysis thread panicked");
            }
        }
    }
}

impl Drop for PeriodicAnalysis {
    fn drop(&mut self) {
        self.shutdown();
    }
}
