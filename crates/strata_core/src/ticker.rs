//! # Ticker
//!
//! Fixed-rate simulation loop on a dedicated thread.
//!
//! ## Design
//!
//! The loop must:
//! - Invoke [`Tickable::tick`] every `1000 / tps` ms
//! - Invoke [`Tickable::tick_rare`] every `tick_rare_rate`-th tick
//! - Survive any failure of the target (errors and panics are logged)
//! - Warn when it falls behind, at most once per nag delay
//! - Let [`Ticker::pause`] return only once no tick is in flight
//!
//! The ticker holds only a `Weak` reference to its target, so dropping the
//! world ends the loop.

use crate::error::{SchedulerError, SchedulerResult, TickError};
use crate::scheduler::{panic_message, CancellableThreadScheduler};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, Thread};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Something driven by the ticker.
pub trait Tickable: Send + Sync {
    /// Called once per tick.
    ///
    /// # Errors
    ///
    /// Any error is logged by the ticker; the loop continues.
    fn tick(&self) -> Result<(), TickError>;

    /// Called every `tick_rare_rate`-th tick, after `tick`.
    ///
    /// # Errors
    ///
    /// Any error is logged by the ticker; the loop continues.
    fn tick_rare(&self) -> Result<(), TickError>;
}

/// Ticker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Ticks per second.
    pub tps: u32,
    /// Ticks between rare ticks.
    pub tick_rare_rate: u32,
    /// Overrun (beyond the tick budget) tolerated before warning.
    pub lag_tolerance_ms: u64,
    /// Minimum time between two "can't keep up" warnings.
    pub nag_delay_ms: u64,
    /// Name of the ticker thread.
    pub thread_name: String,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            tps: 20,
            tick_rare_rate: 20,
            lag_tolerance_ms: 25,
            nag_delay_ms: 15_000,
            thread_name: "strata-ticker".to_string(),
        }
    }
}

impl TickerConfig {
    /// Time budget of one tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tps.max(1)))
    }
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late ticks (took longer than budget).
    pub late_ticks: u64,
    /// Ticks whose target returned an error or panicked.
    pub failed_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn record(&mut self, duration: Duration, budget: Duration, failed: bool) {
        let duration_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        if self.total_ticks == 0 {
            self.min_tick_us = duration_us;
            self.avg_tick_us = duration_us;
        }
        self.total_ticks += 1;
        self.min_tick_us = self.min_tick_us.min(duration_us);
        self.max_tick_us = self.max_tick_us.max(duration_us);
        // Rolling average
        self.avg_tick_us = (self.avg_tick_us * 15 + duration_us) / 16;
        if duration > budget {
            self.late_ticks += 1;
        }
        if failed {
            self.failed_ticks += 1;
        }
    }
}

struct TickerShared {
    running: AtomicBool,
    paused: AtomicBool,
    tick_count: AtomicU64,
    stats: Mutex<TickStats>,
    thread: Mutex<Option<Thread>>,
    /// Held for the duration of each tick.
    in_tick: Mutex<()>,
}

/// Fixed-rate loop driving a [`Tickable`].
pub struct Ticker {
    config: TickerConfig,
    shared: Arc<TickerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    /// Creates a stopped ticker.
    #[must_use]
    pub fn new(config: TickerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(TickerShared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                tick_count: AtomicU64::new(0),
                stats: Mutex::new(TickStats::default()),
                thread: Mutex::new(None),
                in_tick: Mutex::new(()),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Ticker configuration.
    #[must_use]
    pub fn config(&self) -> &TickerConfig {
        &self.config
    }

    /// Starts the loop on its own thread.
    ///
    /// Starting an already running ticker is a no-op.
    ///
    /// # Panics
    ///
    /// Panics unless called from the scheduler's designated main thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutDown`] if `scheduler` has been shut
    /// down, and [`SchedulerError::Spawn`] if the thread cannot be created.
    pub fn start(
        &self,
        scheduler: &CancellableThreadScheduler,
        target: Weak<dyn Tickable>,
    ) -> SchedulerResult<()> {
        assert!(
            scheduler.is_main_thread(),
            "Ticker::start called from {:?}, which is not the designated main thread",
            thread::current().name().unwrap_or("<unnamed>")
        );
        if scheduler.is_shut_down() {
            warn!("refusing to start ticker on a shut down scheduler");
            return Err(SchedulerError::ShutDown);
        }

        let mut handle = self.handle.lock();
        if handle.is_some() && self.is_running() {
            warn!("ticker already running");
            return Ok(());
        }
        if let Some(finished) = handle.take() {
            // The previous loop exited on its own after its target was dropped.
            if finished.join().is_err() {
                error!("previous ticker thread panicked");
            }
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let name = self.config.thread_name.clone();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(&shared, &config, &target));

        match spawned {
            Ok(join) => {
                *self.shared.thread.lock() = Some(join.thread().clone());
                *handle = Some(join);
                info!(tps = self.config.tps, "ticker started");
                Ok(())
            }
            Err(source) => {
                self.shared.running.store(false, Ordering::Release);
                Err(SchedulerError::Spawn { name, source })
            }
        }
    }

    /// Suppresses ticking without stopping the thread.
    ///
    /// Blocks until a tick already in flight has returned, unless called
    /// from inside a tick.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            debug!("ticker paused");
        }
        if !self.on_ticker_thread() {
            drop(self.shared.in_tick.lock());
        }
    }

    fn on_ticker_thread(&self) -> bool {
        self.shared
            .thread
            .lock()
            .as_ref()
            .is_some_and(|thread| thread.id() == thread::current().id())
    }

    /// Resumes ticking after [`Self::pause`].
    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            debug!("ticker resumed");
        }
        self.wake();
    }

    /// Stops the loop and joins the thread. Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.wake();
        if let Some(join) = self.handle.lock().take() {
            if join.thread().id() == thread::current().id() {
                // Stopped from inside a tick; the loop exits on its own.
                return;
            }
            if join.join().is_err() {
                error!("ticker thread panicked");
            }
        }
        *self.shared.thread.lock() = None;
        info!(ticks = self.tick_count(), "ticker stopped");
    }

    fn wake(&self) {
        if let Some(thread) = self.shared.thread.lock().as_ref() {
            thread.unpark();
        }
    }

    /// Returns true if ticking is suppressed.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Returns true while the loop thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Ticks executed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count.load(Ordering::Acquire)
    }

    /// Snapshot of the timing statistics.
    #[must_use]
    pub fn stats(&self) -> TickStats {
        *self.shared.stats.lock()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("tps", &self.config.tps)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("ticks", &self.tick_count())
            .finish()
    }
}

fn run_loop(shared: &TickerShared, config: &TickerConfig, target: &Weak<dyn Tickable>) {
    let budget = config.tick_duration();
    let tolerance = Duration::from_millis(config.lag_tolerance_ms);
    let nag_delay = Duration::from_millis(config.nag_delay_ms);
    let rare_rate = u64::from(config.tick_rare_rate.max(1));
    let mut last_nag: Option<Instant> = None;

    while shared.running.load(Ordering::Acquire) {
        let start = Instant::now();
        let in_tick = shared.in_tick.lock();

        if !shared.paused.load(Ordering::Acquire) {
            let Some(target) = target.upgrade() else {
                debug!("tick target dropped, ticker exiting");
                shared.running.store(false, Ordering::Release);
                break;
            };

            let tick = shared.tick_count.fetch_add(1, Ordering::AcqRel) + 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                target.tick()?;
                if tick % rare_rate == 0 {
                    target.tick_rare()?;
                }
                Ok::<(), TickError>(())
            }));
            drop(target);

            let failed = match outcome {
                Ok(Ok(())) => false,
                Ok(Err(err)) => {
                    error!(tick, "tick failed: {err}");
                    true
                }
                Err(payload) => {
                    error!(tick, "tick panicked: {}", panic_message(payload.as_ref()));
                    true
                }
            };

            let elapsed = start.elapsed();
            shared.stats.lock().record(elapsed, budget, failed);

            if elapsed > budget + tolerance && last_nag.map_or(true, |at| at.elapsed() >= nag_delay) {
                warn!(
                    "Can't keep up! Tick took {}ms, budget is {}ms",
                    elapsed.as_millis(),
                    budget.as_millis()
                );
                last_nag = Some(Instant::now());
            }
        }
        drop(in_tick);

        let elapsed = start.elapsed();
        if elapsed < budget {
            thread::park_timeout(budget - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        ticks: AtomicUsize,
        rare: AtomicUsize,
        fail_every: usize,
    }

    impl Tickable for Counter {
        fn tick(&self) -> Result<(), TickError> {
            let n = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && n % self.fail_every == 0 {
                return Err(TickError::Other(format!("tick {n} failed")));
            }
            Ok(())
        }

        fn tick_rare(&self) -> Result<(), TickError> {
            self.rare.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_config() -> TickerConfig {
        TickerConfig {
            tps: 200,
            tick_rare_rate: 5,
            ..TickerConfig::default()
        }
    }

    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_tick_duration() {
        let config = TickerConfig {
            tps: 20,
            ..TickerConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_ticks_and_rare_ticks() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let counter = Arc::new(Counter::default());
        let target: Arc<dyn Tickable> = counter.clone();

        let ticker = Ticker::new(fast_config());
        ticker.start(&scheduler, Arc::downgrade(&target)).unwrap();

        assert!(wait_until(|| counter.ticks.load(Ordering::SeqCst) >= 20));
        ticker.stop();

        let ticks = counter.ticks.load(Ordering::SeqCst);
        let rare = counter.rare.load(Ordering::SeqCst);
        println!("ticks={ticks} rare={rare}");
        assert!(rare >= ticks / 5 - 1 && rare <= ticks / 5, "rare ticks out of ratio");
        assert!(!ticker.is_running());
    }

    #[test]
    fn test_errors_do_not_stop_the_loop() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let counter = Arc::new(Counter {
            fail_every: 2,
            ..Counter::default()
        });
        let target: Arc<dyn Tickable> = counter.clone();

        let ticker = Ticker::new(fast_config());
        ticker.start(&scheduler, Arc::downgrade(&target)).unwrap();
        assert!(wait_until(|| counter.ticks.load(Ordering::SeqCst) >= 10));
        ticker.stop();

        assert!(ticker.stats().failed_ticks >= 4);
    }

    #[test]
    fn test_pause_suppresses_ticks() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let counter = Arc::new(Counter::default());
        let target: Arc<dyn Tickable> = counter.clone();

        let ticker = Ticker::new(fast_config());
        ticker.start(&scheduler, Arc::downgrade(&target)).unwrap();
        assert!(wait_until(|| counter.ticks.load(Ordering::SeqCst) >= 3));

        ticker.pause();
        let frozen = counter.ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.ticks.load(Ordering::SeqCst), frozen, "ticked while paused");
        assert!(ticker.is_running());

        ticker.resume();
        assert!(wait_until(|| counter.ticks.load(Ordering::SeqCst) > frozen));
        ticker.stop();
    }

    struct Slow {
        entered: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Tickable for Slow {
        fn tick(&self) -> Result<(), TickError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(60));
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn tick_rare(&self) -> Result<(), TickError> {
            Ok(())
        }
    }

    #[test]
    fn test_pause_waits_for_running_tick() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let slow = Arc::new(Slow {
            entered: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let target: Arc<dyn Tickable> = slow.clone();

        let ticker = Ticker::new(fast_config());
        ticker.start(&scheduler, Arc::downgrade(&target)).unwrap();
        assert!(wait_until(|| slow.entered.load(Ordering::SeqCst) >= 1));

        ticker.pause();
        let entered = slow.entered.load(Ordering::SeqCst);
        assert_eq!(slow.finished.load(Ordering::SeqCst), entered, "pause returned mid-tick");

        thread::sleep(Duration::from_millis(100));
        assert_eq!(slow.entered.load(Ordering::SeqCst), entered, "ticked while paused");
        ticker.stop();
    }

    #[test]
    fn test_start_after_scheduler_shutdown_fails() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let target: Arc<dyn Tickable> = Arc::new(Counter::default());
        scheduler.shutdown();

        let ticker = Ticker::new(fast_config());
        let result = ticker.start(&scheduler, Arc::downgrade(&target));

        assert!(matches!(result, Err(SchedulerError::ShutDown)));
        assert!(!ticker.is_running());
    }

    #[test]
    fn test_dropping_target_ends_loop() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let target: Arc<dyn Tickable> = Arc::new(Counter::default());

        let ticker = Ticker::new(fast_config());
        ticker.start(&scheduler, Arc::downgrade(&target)).unwrap();
        drop(target);

        assert!(wait_until(|| !ticker.is_running()));
    }

    #[test]
    fn test_start_off_main_thread_panics() {
        let scheduler = Arc::new(CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap());
        let target: Arc<dyn Tickable> = Arc::new(Counter::default());
        let weak = Arc::downgrade(&target);

        let remote = Arc::clone(&scheduler);
        let result = thread::spawn(move || {
            let ticker = Ticker::new(fast_config());
            let _ = ticker.start(&remote, weak);
        })
        .join();

        assert!(result.is_err(), "start must panic off the main thread");
    }
}
