//! Named recurring tasks driven by tokio timers.
//!
//! Each task gets its own ticker. A tick that fires while the previous run
//! of the same task is still in flight is skipped, not queued. On shutdown
//! the tickers stop and in-flight runs get a grace period before they are
//! aborted.

pub mod clock;

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

struct TaskState {
    name: String,
    period: Duration,
    job: Job,
    running: AtomicBool,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the running flag when a run ends, including by abort or panic.
struct RunningGuard(Arc<TaskState>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

impl TaskState {
    /// Starts a run unless one is in flight. The receiver fires when the
    /// run completes.
    fn try_start(self: &Arc<Self>) -> Option<oneshot::Receiver<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        let guard = RunningGuard(self.clone());
        let fut = (self.job)();
        let name = self.name.clone();
        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            debug!(task = %name, "Task run started.");
            fut.await;
            debug!(task = %name, "Task run finished.");
            let _ = done_tx.send(());
        });
        *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Some(done_rx)
    }

    fn take_in_flight(&self) -> Option<JoinHandle<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Arc<TaskState>>,
    skip_initial_run: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// First runs happen one period after start instead of immediately.
    pub fn without_initial_run(mut self) -> Self {
        self.skip_initial_run = true;
        self
    }

    /// Registers `run` to be called every `period`.
    pub fn every<F, Fut>(&mut self, name: impl Into<String>, period: Duration, run: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(run()) });
        self.tasks.push(Arc::new(TaskState {
            name: name.into(),
            period,
            job,
            running: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        }));
        self
    }

    /// Spawns one ticker per task.
    pub fn start(self, shutdown_grace: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tickers = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let task = task.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            let first_tick = if self.skip_initial_run {
                Instant::now() + task.period
            } else {
                Instant::now()
            };
            info!(task = %task.name, period_secs = task.period.as_secs(), "Scheduling task.");
            tickers.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(first_tick, task.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = ticker.tick() => {
                            if task.try_start().is_none() {
                                warn!(task = %task.name, "Previous run still in progress, skipping tick.");
                            }
                        }
                    }
                }
                debug!(task = %task.name, "Ticker stopped.");
            }));
        }

        let tasks = self
            .tasks
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        SchedulerHandle {
            tasks,
            tickers: Mutex::new(tickers),
            shutdown_tx,
            shutdown_grace,
        }
    }
}

pub struct SchedulerHandle {
    tasks: HashMap<String, Arc<TaskState>>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_grace: Duration,
}

impl SchedulerHandle {
    /// Runs a task now, outside its schedule, and waits for it. Returns
    /// `false` without running if the task is already in flight.
    pub async fn run_now(&self, name: &str) -> Result<bool, SchedulerError> {
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownTask(name.to_string()))?;
        match task.try_start() {
            Some(done) => {
                if done.await.is_err() {
                    error!(task = %name, "Task run ended without completing.");
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    /// Stops all tickers, then waits up to the grace period for in-flight
    /// runs before aborting them. Later calls find nothing left to stop.
    pub async fn shutdown(&self) {
        info!("Scheduler shutting down.");
        let _ = self.shutdown_tx.send(true);
        let tickers = std::mem::take(&mut *self.tickers.lock().unwrap_or_else(|e| e.into_inner()));
        for ticker in tickers {
            let _ = ticker.await;
        }

        let mut in_flight = Vec::new();
        for task in self.tasks.values() {
            if let Some(handle) = task.take_in_flight() {
                if !handle.is_finished() {
                    in_flight.push((task.name.clone(), handle));
                }
            }
        }
        if in_flight.is_empty() {
            info!("Scheduler stopped.");
            return;
        }

        info!(count = in_flight.len(), "Waiting for in-flight task runs.");
        let deadline = Instant::now() + self.shutdown_grace;
        for (name, mut handle) in in_flight {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => debug!(task = %name, "In-flight run completed."),
                Err(_) => {
                    warn!(task = %name, "Grace period elapsed, aborting in-flight run.");
                    handle.abort();
                }
            }
        }
        info!("Scheduler stopped.");
    }
}
