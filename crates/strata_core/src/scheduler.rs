//! # Cancellable Thread Scheduler
//!
//! **Tracked task execution across a worker pool and the main thread**
//!
//! Every subsystem that must not block its caller (lighting, collision retry,
//! network notification, chunk streaming) pushes work through this scheduler.
//!
//! ## Architecture
//!
//! ```text
//!   execute_async ──────────────────────────┐
//!   schedule_async ──> [Delay Heap] ─timer─>├──> [Worker Pool] ──> job
//!                                            │
//!   execute_sync ───────────────────────────┐
//!   schedule_sync ──> [Delay Heap] ─timer─> ├──> [Main Queue] ──> run_sync_tasks()
//! ```
//!
//! Every submitted job gets a [`TaskHandle`] and stays in the tracked set
//! until it completes or is cancelled, so [`CancellableThreadScheduler::cancel_tasks`]
//! and [`CancellableThreadScheduler::wait_idle`] can reason about everything
//! outstanding.
//!
//! ## Synchronous Mode
//!
//! With `threads == 0` no worker or timer thread is started. Async jobs run
//! inline on the caller and delayed jobs run on the main thread the next
//! time it pumps [`CancellableThreadScheduler::run_sync_tasks`] after they
//! are due. Tests use this for deterministic ordering.

use crate::error::{SchedulerError, SchedulerResult};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long the timer sleeps when it has nothing scheduled.
const TIMER_IDLE_POLL: Duration = Duration::from_millis(100);

/// Granularity of `wait_idle` when it also pumps the main queue.
const PUMP_INTERVAL: Duration = Duration::from_millis(2);

/// Scheduler configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads. Zero runs every async job inline.
    pub threads: usize,
    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().saturating_sub(1).clamp(1, 8),
            thread_name: "strata-worker".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Deterministic configuration: no threads, everything inline.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            threads: 0,
            ..Self::default()
        }
    }

    /// Default configuration with an explicit worker count.
    #[must_use]
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }
}

// =============================================================================
// TASK STATE
// =============================================================================

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

/// Lifecycle of one submitted job.
///
/// `QUEUED -> RUNNING -> DONE` or `QUEUED -> CANCELLED`. Both transitions out
/// of `QUEUED` are compare-and-swap, so a job is either run or cancelled,
/// never both.
struct TaskState {
    id: u64,
    status: AtomicU8,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl TaskState {
    fn new(id: u64) -> Self {
        Self {
            id,
            status: AtomicU8::new(QUEUED),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn try_start(&self) -> bool {
        self.status
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn try_cancel(&self) -> bool {
        let cancelled = self
            .status
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.wake();
        }
        cancelled
    }

    fn finish(&self) {
        self.status.store(DONE, Ordering::Release);
        self.wake();
    }

    fn wake(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    fn status(&self) -> u8 {
        self.status.load(Ordering::Acquire)
    }

    fn is_settled(&self) -> bool {
        matches!(self.status(), DONE | CANCELLED)
    }
}

/// Handle to a submitted job.
///
/// Dropping the handle does not cancel the job.
pub struct TaskHandle {
    state: Arc<TaskState>,
    shared: Arc<Shared>,
}

impl TaskHandle {
    /// Scheduler-unique task id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Cancels the job if it has not started yet.
    ///
    /// Returns `true` if this call prevented the job from running. A running
    /// job always completes.
    pub fn cancel(&self) -> bool {
        self.shared.cancel(&self.state)
    }

    /// Returns true if the job was cancelled before it ran.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.status() == CANCELLED
    }

    /// Returns true if the job ran to completion (including by panicking).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.status() == DONE
    }

    /// Blocks until the job completes or is cancelled.
    pub fn wait(&self) {
        if self.state.is_settled() {
            return;
        }
        let mut guard = self.state.mutex.lock();
        while !self.state.is_settled() {
            self.state.condvar.wait(&mut guard);
        }
    }

    /// Blocks up to `timeout`. Returns true if the job settled in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.mutex.lock();
        while !self.state.is_settled() {
            if self.state.condvar.wait_until(&mut guard, deadline).timed_out() {
                return self.state.is_settled();
            }
        }
        true
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.state.id)
            .field("status", &self.state.status())
            .finish()
    }
}

struct Scheduled {
    state: Arc<TaskState>,
    job: Job,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Async,
    Sync,
}

/// Entry in the delay heap, ordered so the earliest due time pops first.
struct Delayed {
    due: Instant,
    seq: u64,
    target: Target,
    task: Scheduled,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Scheduler counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs submitted.
    pub submitted: u64,
    /// Jobs that ran (including panicked ones).
    pub completed: u64,
    /// Jobs cancelled before running.
    pub cancelled: u64,
    /// Jobs that panicked.
    pub panicked: u64,
    /// Jobs currently tracked.
    pub pending: usize,
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct Shared {
    tracked: Mutex<HashMap<u64, Arc<TaskState>>>,
    idle: Condvar,
    next_id: AtomicU64,
    shutdown: AtomicBool,
    delayed: Mutex<BinaryHeap<Delayed>>,
    delayed_signal: Condvar,
    sync_tx: Sender<Scheduled>,
    sync_rx: Receiver<Scheduled>,
    main_thread: Mutex<ThreadId>,
    submitted: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    panicked: AtomicU64,
}

impl Shared {
    fn track(&self) -> Arc<TaskState> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(TaskState::new(id));
        self.tracked.lock().insert(id, Arc::clone(&state));
        self.submitted.fetch_add(1, Ordering::Relaxed);
        state
    }

    fn untrack(&self, id: u64) {
        let mut tracked = self.tracked.lock();
        if tracked.remove(&id).is_some() && tracked.is_empty() {
            self.idle.notify_all();
        }
    }

    fn cancel(&self, state: &TaskState) -> bool {
        if state.try_cancel() {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
            self.untrack(state.id);
            true
        } else {
            false
        }
    }

    /// Runs a job unless it was cancelled. Returns true if it ran.
    fn run(&self, task: Scheduled) -> bool {
        let Scheduled { state, job } = task;
        if !state.try_start() {
            // Cancelled while queued.
            self.untrack(state.id);
            return false;
        }

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                task = state.id,
                "scheduled task panicked: {}",
                panic_message(payload.as_ref())
            );
        }

        self.completed.fetch_add(1, Ordering::Relaxed);
        state.finish();
        self.untrack(state.id);
        true
    }

    fn take_due(&self, now: Instant) -> Vec<Delayed> {
        let mut heap = self.delayed.lock();
        let mut due = Vec::new();
        while heap.peek().is_some_and(|entry| entry.due <= now) {
            if let Some(entry) = heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// Hands a due entry to its target queue.
    fn dispatch(&self, entry: Delayed, async_tx: Option<&Sender<Scheduled>>) {
        match (entry.target, async_tx) {
            (Target::Async, Some(tx)) => {
                if let Err(err) = tx.send(entry.task) {
                    self.cancel(&err.0.state);
                }
            }
            (Target::Async, None) => {
                self.run(entry.task);
            }
            (Target::Sync, _) => {
                if let Err(err) = self.sync_tx.send(entry.task) {
                    self.cancel(&err.0.state);
                }
            }
        }
    }
}

/// Extracts a printable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn worker_loop(shared: &Shared, rx: &Receiver<Scheduled>) {
    while let Ok(task) = rx.recv() {
        shared.run(task);
    }
    debug!("scheduler worker exiting");
}

fn timer_loop(shared: &Shared, async_tx: &Sender<Scheduled>) {
    let mut heap = shared.delayed.lock();
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match heap.peek().map(|entry| entry.due) {
            None => {
                shared.delayed_signal.wait_for(&mut heap, TIMER_IDLE_POLL);
            }
            Some(due) if due > Instant::now() => {
                shared.delayed_signal.wait_until(&mut heap, due);
            }
            Some(_) => {
                if let Some(entry) = heap.pop() {
                    MutexGuard::unlocked(&mut heap, || shared.dispatch(entry, Some(async_tx)));
                }
            }
        }
    }
    debug!("scheduler timer exiting");
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Bounded worker pool plus main-thread queue with bulk cancellation.
///
/// The thread that constructs the scheduler becomes the designated main
/// thread; use [`Self::bind_main_thread`] to move that role.
pub struct CancellableThreadScheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    async_tx: Mutex<Option<Sender<Scheduled>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl CancellableThreadScheduler {
    /// Starts the scheduler and binds the calling thread as the main thread.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if a worker or timer thread cannot be
    /// started.
    pub fn new(config: SchedulerConfig) -> SchedulerResult<Self> {
        let (sync_tx, sync_rx) = unbounded();
        let shared = Arc::new(Shared {
            tracked: Mutex::new(HashMap::new()),
            idle: Condvar::new(),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            delayed: Mutex::new(BinaryHeap::new()),
            delayed_signal: Condvar::new(),
            sync_tx,
            sync_rx,
            main_thread: Mutex::new(thread::current().id()),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(config.threads);
        let mut timer = None;
        let mut async_tx = None;

        if config.threads > 0 {
            let (tx, rx) = unbounded::<Scheduled>();
            for index in 0..config.threads {
                let name = format!("{}-{index}", config.thread_name);
                let rx = rx.clone();
                let worker_shared = Arc::clone(&shared);
                let handle = thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || worker_loop(&worker_shared, &rx))
                    .map_err(|source| SchedulerError::Spawn { name, source })?;
                workers.push(handle);
            }

            let name = format!("{}-timer", config.thread_name);
            let timer_tx = tx.clone();
            let timer_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || timer_loop(&timer_shared, &timer_tx))
                .map_err(|source| SchedulerError::Spawn { name, source })?;
            timer = Some(handle);
            async_tx = Some(tx);
        }

        info!(threads = config.threads, "scheduler started");

        Ok(Self {
            shared,
            config,
            async_tx: Mutex::new(async_tx),
            workers: Mutex::new(workers),
            timer: Mutex::new(timer),
        })
    }

    /// Scheduler configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns true when async jobs run inline.
    #[must_use]
    pub fn is_synchronous(&self) -> bool {
        self.config.threads == 0
    }

    /// Makes the calling thread the designated main thread.
    pub fn bind_main_thread(&self) {
        *self.shared.main_thread.lock() = thread::current().id();
    }

    /// Returns true if the caller is the designated main thread.
    #[must_use]
    pub fn is_main_thread(&self) -> bool {
        *self.shared.main_thread.lock() == thread::current().id()
    }

    /// Returns true once [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn submit_rejected(&self, job: Job) -> TaskHandle {
        let state = self.shared.track();
        drop(job);
        self.shared.cancel(&state);
        warn!(task = state.id, "task submitted after scheduler shutdown");
        self.handle(state)
    }

    fn handle(&self, state: Arc<TaskState>) -> TaskHandle {
        TaskHandle {
            state,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs `job` on the worker pool (inline when `threads == 0`).
    pub fn execute_async<F>(&self, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shut_down() {
            return self.submit_rejected(Box::new(job));
        }
        let state = self.shared.track();
        let task = Scheduled {
            state: Arc::clone(&state),
            job: Box::new(job),
        };

        let tx = self.async_tx.lock().clone();
        match tx {
            Some(tx) => {
                if let Err(err) = tx.send(task) {
                    self.shared.cancel(&err.0.state);
                }
            }
            None => {
                self.shared.run(task);
            }
        }
        self.handle(state)
    }

    /// Runs `job` on the worker pool after `delay`.
    pub fn schedule_async<F>(&self, delay: Duration, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            return self.execute_async(job);
        }
        self.push_delayed(delay, Target::Async, Box::new(job))
    }

    /// Runs `job` on the main thread.
    ///
    /// Called from the main thread the job runs immediately; otherwise it
    /// waits in the main queue for [`Self::run_sync_tasks`].
    pub fn execute_sync<F>(&self, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shut_down() {
            return self.submit_rejected(Box::new(job));
        }
        let state = self.shared.track();
        let task = Scheduled {
            state: Arc::clone(&state),
            job: Box::new(job),
        };

        if self.is_main_thread() {
            self.shared.run(task);
        } else if let Err(err) = self.shared.sync_tx.send(task) {
            self.shared.cancel(&err.0.state);
        }
        self.handle(state)
    }

    /// Runs `job` on the main thread after `delay`.
    pub fn schedule_sync<F>(&self, delay: Duration, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            return self.execute_sync(job);
        }
        self.push_delayed(delay, Target::Sync, Box::new(job))
    }

    fn push_delayed(&self, delay: Duration, target: Target, job: Job) -> TaskHandle {
        if self.is_shut_down() {
            return self.submit_rejected(job);
        }
        let state = self.shared.track();
        let entry = Delayed {
            due: Instant::now() + delay,
            seq: state.id,
            target,
            task: Scheduled {
                state: Arc::clone(&state),
                job,
            },
        };
        self.shared.delayed.lock().push(entry);
        self.shared.delayed_signal.notify_all();
        self.handle(state)
    }

    /// Drains the main queue. Returns the number of jobs that ran.
    ///
    /// In synchronous mode this also runs every delayed job that is due.
    ///
    /// # Panics
    ///
    /// Panics if called from any thread other than the designated main thread.
    pub fn run_sync_tasks(&self) -> usize {
        assert!(
            self.is_main_thread(),
            "run_sync_tasks must be called from the designated main thread"
        );

        let mut ran = 0;
        if self.is_synchronous() {
            for entry in self.shared.take_due(Instant::now()) {
                if self.shared.run(entry.task) {
                    ran += 1;
                }
            }
        }
        while let Ok(task) = self.shared.sync_rx.try_recv() {
            if self.shared.run(task) {
                ran += 1;
            }
        }
        ran
    }

    /// Cancels every job that has not started yet. Returns how many were
    /// cancelled. Running jobs are left to finish.
    pub fn cancel_tasks(&self) -> usize {
        let states: Vec<Arc<TaskState>> = self.shared.tracked.lock().values().cloned().collect();
        let mut cancelled = states
            .iter()
            .filter(|state| self.shared.cancel(state))
            .count();

        let drained: Vec<Delayed> = self.shared.delayed.lock().drain().collect();
        for entry in drained {
            if self.shared.cancel(&entry.task.state) {
                cancelled += 1;
            }
            self.shared.untrack(entry.task.state.id);
        }
        while let Ok(task) = self.shared.sync_rx.try_recv() {
            if self.shared.cancel(&task.state) {
                cancelled += 1;
            }
            self.shared.untrack(task.state.id);
        }

        if cancelled > 0 {
            debug!(cancelled, "cancelled outstanding tasks");
        }
        cancelled
    }

    /// Waits until no job is tracked. Returns false on timeout.
    ///
    /// On the main thread the main queue is pumped while waiting, so jobs
    /// marshalled onto it cannot deadlock the wait. Must not be called from
    /// inside a scheduled job.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let pump = self.is_main_thread();
        loop {
            if pump {
                self.run_sync_tasks();
            }
            let mut tracked = self.shared.tracked.lock();
            if tracked.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = if pump {
                (deadline - now).min(PUMP_INTERVAL)
            } else {
                deadline - now
            };
            self.shared.idle.wait_for(&mut tracked, slice);
        }
    }

    /// Number of jobs submitted but not yet finished or cancelled.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.shared.tracked.lock().len()
    }

    /// Snapshot of the scheduler counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            panicked: self.shared.panicked.load(Ordering::Relaxed),
            pending: self.pending_tasks(),
        }
    }

    /// Cancels everything outstanding and stops all threads.
    ///
    /// Later submissions are cancelled immediately. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.cancel_tasks();

        self.async_tx.lock().take();
        {
            let _heap = self.shared.delayed.lock();
            self.shared.delayed_signal.notify_all();
        }

        let current = thread::current().id();
        if let Some(timer) = self.timer.lock().take() {
            if timer.thread().id() != current && timer.join().is_err() {
                error!("scheduler timer thread panicked");
            }
        }
        for worker in self.workers.lock().drain(..) {
            if worker.thread().id() != current && worker.join().is_err() {
                error!("scheduler worker thread panicked");
            }
        }

        info!(cancelled, "scheduler shut down");
    }
}

impl Drop for CancellableThreadScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CancellableThreadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableThreadScheduler")
            .field("threads", &self.config.threads)
            .field("pending", &self.pending_tasks())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_synchronous_mode_runs_inline() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let handle = scheduler.execute_async(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 1, "job must run before execute_async returns");
        assert!(handle.is_done());
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn test_pool_runs_all_jobs() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(4)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..200 {
            let c = Arc::clone(&counter);
            scheduler.execute_async(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(scheduler.wait_idle(WAIT), "pool did not drain");
        assert_eq!(counter.load(Ordering::SeqCst), 200);
        assert_eq!(scheduler.stats().completed, 200);
    }

    #[test]
    fn test_schedule_async_respects_delay() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(2)).unwrap();
        let ran_at = Arc::new(Mutex::new(None));
        let start = Instant::now();

        let slot = Arc::clone(&ran_at);
        let handle = scheduler.schedule_async(Duration::from_millis(30), move || {
            *slot.lock() = Some(Instant::now());
        });

        assert!(handle.wait_timeout(WAIT));
        let ran = *ran_at.lock();
        let ran = ran.expect("delayed job did not run");
        assert!(ran.duration_since(start) >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancel_tasks_drops_delayed_jobs() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(2)).unwrap();
        let flag = Arc::new(AtomicBool::new(false));

        let f = Arc::clone(&flag);
        let handle = scheduler.schedule_async(Duration::from_secs(30), move || {
            f.store(true, Ordering::SeqCst);
        });

        assert!(scheduler.cancel_tasks() >= 1);
        assert!(scheduler.wait_idle(WAIT));
        assert!(handle.is_cancelled());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handle_cancel_before_run() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let handle = scheduler.schedule_async(Duration::from_millis(5), || panic!("must not run"));

        assert!(handle.cancel());
        assert!(!handle.cancel(), "second cancel is a no-op");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(scheduler.run_sync_tasks(), 0);
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn test_synchronous_mode_defers_delayed_jobs_to_pump() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::synchronous()).unwrap();
        let flag = Arc::new(AtomicBool::new(false));

        let f = Arc::clone(&flag);
        scheduler.schedule_async(Duration::from_millis(5), move || f.store(true, Ordering::SeqCst));
        assert!(!flag.load(Ordering::SeqCst));

        assert!(scheduler.wait_idle(WAIT));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_execute_sync_marshals_to_main_thread() {
        let scheduler = Arc::new(CancellableThreadScheduler::new(SchedulerConfig::with_threads(1)).unwrap());
        let ran_on = Arc::new(Mutex::new(None));

        let remote = Arc::clone(&scheduler);
        let slot = Arc::clone(&ran_on);
        std::thread::spawn(move || {
            remote.execute_sync(move || {
                *slot.lock() = Some(thread::current().id());
            });
        })
        .join()
        .unwrap();

        assert!(ran_on.lock().is_none(), "sync job ran before the main thread pumped");
        assert_eq!(scheduler.run_sync_tasks(), 1);
        assert_eq!(*ran_on.lock(), Some(thread::current().id()));
    }

    #[test]
    fn test_execute_sync_on_main_thread_is_inline() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(1)).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&flag);
        scheduler.execute_sync(move || f.store(true, Ordering::SeqCst));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(1)).unwrap();
        scheduler.execute_async(|| panic!("boom"));

        let flag = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&flag);
        let handle = scheduler.execute_async(move || f.store(true, Ordering::SeqCst));

        assert!(handle.wait_timeout(WAIT));
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(scheduler.stats().panicked, 1);
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(2)).unwrap();
        scheduler.shutdown();
        assert!(scheduler.is_shut_down());

        let handle = scheduler.execute_async(|| panic!("must not run"));
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.pending_tasks(), 0);

        // Idempotent.
        scheduler.shutdown();
    }

    #[test]
    fn test_handle_wait_blocks_until_done() {
        let scheduler = CancellableThreadScheduler::new(SchedulerConfig::with_threads(1)).unwrap();
        let handle = scheduler.execute_async(|| std::thread::sleep(Duration::from_millis(20)));
        handle.wait();
        assert!(handle.is_done());
    }
}
