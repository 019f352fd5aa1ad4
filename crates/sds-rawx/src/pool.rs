use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sds_types::{SdsError, SdsResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Sizing of a [`WorkerPool`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers kept alive when idle.
    pub min_workers: usize,
    pub max_workers: usize,
    /// Idle milliseconds after which a worker above the minimum exits.
    pub keep_alive_ms: u64,
    /// Thread name of the workers.
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 100,
            keep_alive_ms: 30_000,
            name: "rawx-worker".into(),
        }
    }
}

impl PoolConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

/// Thread pool with synchronous hand-off.
///
/// Tasks are passed to workers over a zero-capacity channel: `submit` returns
/// once a worker has taken the task, spawning a new worker when none is idle
/// and the pool is below `max_workers`, and blocking otherwise.
pub struct WorkerPool {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    config: PoolConfig,
    live: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(mut config: PoolConfig) -> Self {
        config.max_workers = config.max_workers.max(1);
        config.min_workers = config.min_workers.min(config.max_workers);
        let (tx, rx) = channel::bounded(0);
        Self {
            tx,
            rx,
            config,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Workers currently running, idle or busy.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Hand `task` to a worker. Blocks until one accepts it.
    pub fn submit<T, F>(&self, task: F) -> SdsResult<TaskHandle<T>>
    where
        F: FnOnce() -> SdsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let job: Job = Box::new(move || {
            let outcome = if flag.load(Ordering::SeqCst) {
                Err(SdsError::system("Task cancelled before running"))
            } else {
                panic::catch_unwind(AssertUnwindSafe(task))
                    .unwrap_or_else(|_| Err(SdsError::system("Task panicked")))
            };
            // The handle may already be gone.
            let _ = result_tx.send(outcome);
        });
        self.dispatch(job)?;
        Ok(TaskHandle {
            rx: result_rx,
            cancelled,
        })
    }

    fn dispatch(&self, job: Job) -> SdsResult<()> {
        let job = match self.tx.try_send(job) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(job)) => job,
            Err(TrySendError::Disconnected(_)) => {
                return Err(SdsError::system("Worker pool is shut down"))
            }
        };
        if self.reserve_worker() {
            if let Err(e) = self.spawn_worker() {
                self.live.fetch_sub(1, Ordering::SeqCst);
                if self.live_workers() == 0 {
                    return Err(SdsError::system("Unable to spawn a pool worker").with_source(e));
                }
                debug!(error = %e, "worker spawn failed, waiting for an idle worker");
            }
        }
        self.tx
            .send(job)
            .map_err(|_| SdsError::system("Worker pool is shut down"))
    }

    /// Count one more worker if the pool is below its ceiling.
    fn reserve_worker(&self) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.config.max_workers).then_some(live + 1)
            })
            .is_ok()
    }

    fn spawn_worker(&self) -> std::io::Result<()> {
        let rx = self.rx.clone();
        let live = Arc::clone(&self.live);
        let keep_alive = self.config.keep_alive();
        let min_workers = self.config.min_workers;
        thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || worker_loop(rx, live, keep_alive, min_workers))?;
        debug!(live = self.live_workers(), "spawned pool worker");
        Ok(())
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

fn worker_loop(rx: Receiver<Job>, live: Arc<AtomicUsize>, keep_alive: Duration, min_workers: usize) {
    loop {
        match rx.recv_timeout(keep_alive) {
            Ok(job) => job(),
            Err(RecvTimeoutError::Timeout) => {
                let retired = live
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n > min_workers).then(|| n - 1)
                    })
                    .is_ok();
                if retired {
                    debug!("idle pool worker retired");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                live.fetch_sub(1, Ordering::SeqCst);
                return;
            }
        }
    }
}

/// Pending result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: Receiver<SdsResult<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Ask the task not to run.
    ///
    /// The flag is read once, when a worker picks the task up. With
    /// synchronous hand-off that happens as soon as `submit` returns, so a
    /// cancel usually lands on a running task and does nothing; running
    /// tasks have to be stopped through their inputs.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Wait for the task output.
    pub fn join(self) -> SdsResult<T> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(SdsError::system("Task dropped before completion")))
    }
}
