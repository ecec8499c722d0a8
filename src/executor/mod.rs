//! Single-task periodic executor
//!
//! A [`PeriodicExecutor`] invokes one callback at a fixed interval on its own
//! worker thread. The worker drives a private current-thread tokio runtime;
//! each expiry runs the callback to completion and re-arms the timer at
//! `previous_deadline + interval`, so ticks stay on the grid
//! `start + k * interval` no matter how late individual firings are.
//!
//! Callbacks should be short. A callback that overruns the interval delays
//! the following tick, and a deadline that is already in the past fires
//! immediately.

pub mod metrics;
pub mod state;
mod worker;

pub use metrics::{ExecutorStats, TaskMetrics};
pub use state::ExecutorState;

use crate::config::ExecutorConfig;
use crate::error::{CallbackFault, ExecutorError};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};
use worker::{Control, FaultHandler, Shared, Worker, deadline_after};

/// Handle to the worker of one `start`-`stop` cycle.
struct WorkerHandle {
    interval: Duration,
    control: UnboundedSender<Control>,
    thread: JoinHandle<()>,
}

/// Runs a callback periodically on a dedicated background thread.
///
/// All control operations take `&self` and may be called from any thread,
/// including from inside the callback. Dropping the executor stops it.
pub struct PeriodicExecutor {
    config: ExecutorConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
    fault_handler: Option<FaultHandler>,
}

impl PeriodicExecutor {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
            fault_handler: None,
        }
    }

    /// Registers a handler called on the worker thread whenever the callback panics.
    pub fn on_fault<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallbackFault) + Send + Sync + 'static,
    {
        self.fault_handler = Some(Arc::new(handler));
        self
    }

    /// Starts invoking `callback` every `interval`.
    ///
    /// Returns `false` if the executor is already running or the request is
    /// invalid (see [`PeriodicExecutor::try_start`]). The first invocation
    /// happens one interval after this call.
    pub fn start<F>(&self, interval: Duration, callback: F) -> bool
    where
        F: FnMut() + Send + 'static,
    {
        match self.try_start(interval, callback) {
            Ok(()) => true,
            Err(ExecutorError::AlreadyRunning) => {
                debug!("start ignored, executor already running");
                false
            }
            Err(e) => {
                warn!("Failed to start periodic executor: {}", e);
                false
            }
        }
    }

    /// Like [`PeriodicExecutor::start`], reporting why a start was refused.
    ///
    /// A zero `interval` is rejected with [`ExecutorError::ZeroInterval`].
    pub fn try_start<F>(&self, interval: Duration, callback: F) -> Result<(), ExecutorError>
    where
        F: FnMut() + Send + 'static,
    {
        let mut slot = self.lock_worker();
        if self.shared.state.load() != ExecutorState::Idle {
            return Err(ExecutorError::AlreadyRunning);
        }
        if interval.is_zero() {
            return Err(ExecutorError::ZeroInterval);
        }

        let first_deadline = deadline_after(Instant::now(), interval)
            .ok_or(ExecutorError::IntervalOverflow(interval))?;

        *self.shared.stats() = ExecutorStats::new(TaskMetrics::new(
            self.config.metrics_window(),
            self.config.slow_threshold_for(interval),
        ));
        if !self
            .shared
            .state
            .transition(ExecutorState::Idle, ExecutorState::Armed)
        {
            return Err(ExecutorError::AlreadyRunning);
        }

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.shared.state.store(ExecutorState::Idle);
                return Err(ExecutorError::Runtime(e));
            }
        };

        let worker = Worker::new(
            self.shared.clone(),
            Box::new(callback),
            interval,
            self.config.slow_threshold_for(interval),
            self.config.fault_policy,
            self.fault_handler.clone(),
        );
        let (control, control_rx) = mpsc::unbounded_channel();
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run(runtime, first_deadline, control_rx));

        match spawned {
            Ok(thread) => {
                *slot = Some(WorkerHandle {
                    interval,
                    control,
                    thread,
                });
                info!(
                    "Periodic executor '{}' started with {:?} interval",
                    self.config.thread_name, interval
                );
                Ok(())
            }
            Err(e) => {
                self.shared.state.store(ExecutorState::Idle);
                Err(ExecutorError::Spawn(e))
            }
        }
    }

    /// Cancels the pending wait, terminates the worker and waits for it to exit.
    ///
    /// Blocks while an invocation is in flight. Does nothing if the executor
    /// is not running. Called from inside the callback, it cannot wait for its
    /// own thread: the worker is detached, the state reads `Stopping` until the
    /// callback has returned and the worker has exited, and only then `Idle`.
    pub fn stop(&self) {
        let handle = {
            let mut slot = self.lock_worker();
            let Some(handle) = slot.take() else {
                return;
            };
            self.shared.state.store(ExecutorState::Stopping);
            // A send error means the worker is already gone.
            let _ = handle.control.send(Control::Stop);
            handle
        };

        let WorkerHandle {
            control, thread, ..
        } = handle;
        drop(control);

        if thread.thread().id() == thread::current().id() {
            // Stays `Stopping` until the worker itself has exited.
            debug!("stop called from the callback, worker detached");
            return;
        }
        if thread.join().is_err() {
            error!("Periodic worker '{}' terminated abnormally", self.config.thread_name);
        }

        // Usually done by the exiting worker already; a new cycle may be armed by now.
        self.shared
            .state
            .transition(ExecutorState::Stopping, ExecutorState::Idle);
        info!("Periodic executor '{}' stopped", self.config.thread_name);
    }

    /// Cancels the pending wait without stopping the worker.
    ///
    /// An invocation that has already been dispatched still completes.
    pub fn pause(&self) {
        let slot = self.lock_worker();
        let Some(handle) = slot.as_ref() else {
            return;
        };
        if self
            .shared
            .state
            .transition(ExecutorState::Armed, ExecutorState::Paused)
        {
            let _ = handle.control.send(Control::Pause);
            debug!("Periodic executor '{}' paused", self.config.thread_name);
        }
    }

    /// Re-arms the timer one interval from now. Ticks missed while paused
    /// are not replayed.
    pub fn resume(&self) {
        let slot = self.lock_worker();
        let Some(handle) = slot.as_ref() else {
            return;
        };
        if !self
            .shared
            .state
            .transition(ExecutorState::Paused, ExecutorState::Armed)
        {
            return;
        }

        match deadline_after(Instant::now(), handle.interval) {
            Some(deadline) => {
                let _ = handle.control.send(Control::Resume { deadline });
                debug!("Periodic executor '{}' resumed", self.config.thread_name);
            }
            None => {
                error!("Resume deadline overflows the monotonic clock, staying paused");
                self.shared.state.store(ExecutorState::Paused);
            }
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ExecutorState::Paused
    }

    /// Interval of the current cycle, `None` when idle.
    pub fn interval(&self) -> Option<Duration> {
        self.lock_worker().as_ref().map(|handle| handle.interval)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Statistics of the current (or last) cycle. Reset by `start`.
    pub fn stats(&self) -> ExecutorStats {
        self.shared.stats().clone()
    }

    pub fn last_fault(&self) -> Option<CallbackFault> {
        self.shared.stats().last_fault.clone()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PeriodicExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PeriodicExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}
