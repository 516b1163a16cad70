//! Fixed-period scheduler thread.
//!
//! The scheduler thread owns the [`CycleEngine`] exclusively. Other threads
//! talk to it through a [`SchedulerHandle`]: diffs and tag writes are staged
//! and consumed at the cycle boundary, frames are published behind an `Arc`,
//! and snapshots go to a separate writer thread over a bounded channel so
//! persistence overlaps the next cycle.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use ps_controls::Registry;
use ps_core::{SignalKey, Value, ValueMap};
use ps_graph::ValidationError;
use ps_project::{Diff, ProjectConfig};
use ps_snapshot::{SnapshotManager, SnapshotRecord, StateMap, merge};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::engine::{CycleEngine, PublishedFrame};
use crate::error::{RuntimeError, RuntimeResult};
use crate::options::SchedulerOptions;
use crate::staging::{DiffOutcome, DiffTicket, PendingSlot, WriteQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// How a scheduler run ended.
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Cycles completed.
    pub cycles: u64,
    /// Cycles whose work took longer than the period.
    pub overruns: u64,
    /// Snapshot saved on the way out.
    pub final_snapshot: SnapshotRecord,
    pub last_frame: Option<Arc<PublishedFrame>>,
}

type FrameSender = Sender<Arc<PublishedFrame>>;
type SnapshotJob = (u64, ValueMap, StateMap);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the handle and the scheduler thread.
struct Shared {
    pending: PendingSlot,
    writes: WriteQueue,
    stop: AtomicBool,
    running: AtomicBool,
    latest: Mutex<Option<Arc<PublishedFrame>>>,
    subscribers: Mutex<Vec<FrameSender>>,
    wake: Sender<()>,
}

/// Writer-thread health, read by the scheduler each cycle.
#[derive(Default)]
struct Persistence {
    consecutive_failures: AtomicU32,
    last_error: Mutex<Option<String>>,
}

fn writer_loop(jobs: Receiver<SnapshotJob>, snapshots: SnapshotManager, health: Arc<Persistence>) {
    for (cycle, values, states) in jobs {
        match snapshots.save(cycle, values, states) {
            Ok(_) => {
                health.consecutive_failures.store(0, Ordering::Release);
                debug!(cycle, "snapshot saved");
            }
            Err(e) => {
                let failures = health.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(cycle, failures, error = %e, "snapshot save failed");
                *lock(&health.last_error) = Some(e.to_string());
            }
        }
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Load `config`, restore the latest snapshot and start cycling.
    ///
    /// Errors here are startup failures: nothing is left running.
    pub fn start(
        config: &ProjectConfig,
        registry: Registry,
        snapshots: SnapshotManager,
        options: SchedulerOptions,
    ) -> RuntimeResult<SchedulerHandle> {
        options.validate()?;

        let snapshot = snapshots.load()?;
        let merged = merge(config, snapshot.as_ref(), &registry);
        let (engine, report) = CycleEngine::from_merged(&merged, registry, options.load_policy)?;
        let period = Duration::try_from_secs_f64(engine.live_period_s()).map_err(|_| {
            RuntimeError::InvalidOption {
                what: "cycle_time_s does not fit a timer period",
            }
        })?;
        if !report.is_clean() {
            warn!(
                pruned_connections = report.pruned_connections.len(),
                dropped_order = report.dropped_order.is_some(),
                "configuration loaded leniently"
            );
        }

        let (wake, wake_rx) = bounded(1);
        let shared = Arc::new(Shared {
            pending: PendingSlot::default(),
            writes: WriteQueue::default(),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(true),
            latest: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            wake,
        });

        let health = Arc::new(Persistence::default());
        let (jobs, jobs_rx) = bounded(options.snapshot_queue_depth);
        let writer = {
            let snapshots = snapshots.clone();
            let health = Arc::clone(&health);
            thread::Builder::new()
                .name("ps-snapshot".into())
                .spawn(move || writer_loop(jobs_rx, snapshots, health))
                .map_err(|source| RuntimeError::Spawn {
                    what: "snapshot writer",
                    source,
                })?
        };

        info!(
            period_ms = period.as_millis() as u64,
            instances = engine.store().len(),
            restored = snapshot.is_some(),
            "scheduler starting"
        );
        let worker = Worker {
            engine,
            shared: Arc::clone(&shared),
            options,
            snapshots,
            jobs: Some(jobs),
            writer: Some(writer),
            health,
            wake_rx,
            period,
            overruns: 0,
        };
        let thread = thread::Builder::new()
            .name("ps-scheduler".into())
            .spawn(move || worker.run())
            .map_err(|source| RuntimeError::Spawn {
                what: "scheduler",
                source,
            })?;

        Ok(SchedulerHandle {
            shared,
            thread: Some(thread),
        })
    }
}

/// State owned by the scheduler thread.
struct Worker {
    engine: CycleEngine,
    shared: Arc<Shared>,
    options: SchedulerOptions,
    snapshots: SnapshotManager,
    jobs: Option<Sender<SnapshotJob>>,
    writer: Option<JoinHandle<()>>,
    health: Arc<Persistence>,
    wake_rx: Receiver<()>,
    period: Duration,
    overruns: u64,
}

impl Worker {
    fn run(mut self) -> RuntimeResult<StopReport> {
        let mut fatal = None;
        loop {
            if self.shared.stop.load(Ordering::Acquire) {
                break;
            }
            if self
                .options
                .max_cycles
                .is_some_and(|max| self.engine.cycle() >= max)
            {
                break;
            }
            let failures = self.health.consecutive_failures.load(Ordering::Acquire);
            if failures >= self.options.max_snapshot_failures {
                let last = lock(&self.health.last_error).clone().unwrap_or_default();
                error!(failures, last = %last, "snapshot persistence failed, stopping");
                fatal = Some(RuntimeError::PersistenceFailed { failures, last });
                break;
            }

            let started = Instant::now();
            self.cycle();

            let elapsed = started.elapsed();
            if elapsed >= self.period {
                self.overruns += 1;
                warn!(
                    cycle = self.engine.cycle(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = self.period.as_millis() as u64,
                    "cycle overran its period"
                );
                continue;
            }
            // Woken early only by stop().
            let _ = self.wake_rx.recv_timeout(self.period - elapsed);
        }
        self.finish(fatal)
    }

    fn cycle(&mut self) {
        for (key, value) in self.shared.writes.drain() {
            if !self.engine.write_value(&key, value) {
                warn!(key = %key, "dropping write to unknown instance");
            }
        }

        self.engine.execute_cycle();

        let frame = Arc::new(self.engine.frame());
        *lock(&self.shared.latest) = Some(Arc::clone(&frame));
        lock(&self.shared.subscribers).retain(|tx| match tx.try_send(Arc::clone(&frame)) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });

        let cycle = self.engine.cycle();
        let captured = (cycle % self.options.snapshot_every == 0).then(|| self.engine.capture());

        if let Some(staged) = self.shared.pending.take() {
            let outcome = match self.engine.apply_diff(&staged.diff) {
                Ok(summary) => {
                    info!(
                        diff = %staged.id,
                        cycle,
                        added = summary.added.len(),
                        removed = summary.removed.len(),
                        modified = summary.modified.len(),
                        "diff applied"
                    );
                    self.persist_config();
                    DiffOutcome::Applied { cycle, summary }
                }
                Err(e) => {
                    warn!(diff = %staged.id, cycle, error = %e, "diff rejected");
                    DiffOutcome::Rejected(e)
                }
            };
            staged.resolve(outcome);
        }

        if let (Some((values, states)), Some(jobs)) = (captured, &self.jobs) {
            if let Err(TrySendError::Full(_)) = jobs.try_send((cycle, values, states)) {
                warn!(cycle, "snapshot writer busy, skipping snapshot");
            }
        }
    }

    fn persist_config(&self) {
        let Some(path) = &self.options.persist_config_to else {
            return;
        };
        let config = ProjectConfig::from_store(self.engine.store());
        match ps_project::save(path, &config) {
            Ok(()) => debug!(path = %path.display(), "configuration saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to save configuration"),
        }
    }

    fn finish(mut self, fatal: Option<RuntimeError>) -> RuntimeResult<StopReport> {
        self.shared.running.store(false, Ordering::Release);
        self.shared.pending.abandon();

        drop(self.jobs.take());
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!("snapshot writer panicked");
            }
        }
        lock(&self.shared.subscribers).clear();

        if let Some(e) = fatal {
            return Err(e);
        }

        let (values, states) = self.engine.capture();
        let final_snapshot = self.snapshots.save(self.engine.cycle(), values, states)?;
        info!(
            cycles = self.engine.cycle(),
            overruns = self.overruns,
            "scheduler stopped"
        );
        Ok(StopReport {
            cycles: self.engine.cycle(),
            overruns: self.overruns,
            final_snapshot,
            last_frame: lock(&self.shared.latest).clone(),
        })
    }
}

/// Control surface for a running scheduler. Dropping it stops the scheduler.
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<RuntimeResult<StopReport>>>,
}

impl SchedulerHandle {
    /// Stage `diff` for the next cycle boundary, replacing any pending one.
    pub fn submit_diff(&self, diff: Diff) -> DiffTicket {
        let ticket = self.shared.pending.stage(diff);
        if !self.shared.running.load(Ordering::Acquire) {
            self.shared.pending.abandon();
        }
        ticket
    }

    /// Queue a write to a live `"instance.param"` slot for the next cycle.
    pub fn write_value(&self, key: &str, value: Value) -> Result<(), ValidationError> {
        let key = SignalKey::parse(key).map_err(|_| ValidationError::MalformedKey {
            key: key.to_string(),
        })?;
        self.shared.writes.push(key, value);
        Ok(())
    }

    /// Most recently published frame.
    pub fn latest(&self) -> Option<Arc<PublishedFrame>> {
        lock(&self.shared.latest).clone()
    }

    /// Receive every frame from now on. A subscriber that falls `capacity`
    /// frames behind misses frames until it catches up.
    pub fn subscribe(&self, capacity: usize) -> Receiver<Arc<PublishedFrame>> {
        let (tx, rx) = bounded(capacity.max(1));
        if self.shared.running.load(Ordering::Acquire) {
            lock(&self.shared.subscribers).push(tx);
        }
        rx
    }

    pub fn state(&self) -> SchedulerState {
        if self.shared.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Ask the scheduler to stop after the current cycle.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        let _ = self.shared.wake.try_send(());
    }

    /// Wait for the scheduler to stop on its own (cycle limit or fatal error).
    pub fn wait(mut self) -> RuntimeResult<StopReport> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| RuntimeError::Panicked)?,
            None => Err(RuntimeError::Panicked),
        }
    }

    /// Stop and wait.
    pub fn shutdown(self) -> RuntimeResult<StopReport> {
        self.stop();
        self.wait()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop();
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
