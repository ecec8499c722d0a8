//! Background worker: owns the callback and drives the timer loop.

use crate::config::FaultPolicy;
use crate::error::{CallbackFault, panic_message};
use crate::executor::metrics::ExecutorStats;
use crate::executor::state::{AtomicState, ExecutorState};
use log::{debug, error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) type Callback = Box<dyn FnMut() + Send + 'static>;

pub(crate) type FaultHandler = Arc<dyn Fn(&CallbackFault) + Send + Sync + 'static>;

/// Messages from the owning side. Each one cancels the pending wait.
#[derive(Debug)]
pub(crate) enum Control {
    Pause,
    Resume { deadline: Instant },
    Stop,
}

/// State visible to both the owner and the worker.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) state: AtomicState,
    stats: Mutex<ExecutorStats>,
}

impl Shared {
    pub(crate) fn stats(&self) -> MutexGuard<'_, ExecutorStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn deadline_after(from: Instant, interval: Duration) -> Option<Instant> {
    from.checked_add(interval)
}

/// Publishes the end of a worker to the owner when the worker thread unwinds
/// or returns.
///
/// On a normal exit the state only moves from `Stopping` to `Idle` after the
/// callback and the runtime are gone, so a new cycle can never overlap the
/// old one. A worker that dies from a panic leaves the state at `Stopping`
/// and the owner's `stop` reaps it.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Periodic worker terminated by a panic");
            self.0.state.store(ExecutorState::Stopping);
        } else {
            self.0
                .state
                .transition(ExecutorState::Stopping, ExecutorState::Idle);
        }
    }
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    callback: Callback,
    interval: Duration,
    slow_threshold: Duration,
    fault_policy: FaultPolicy,
    fault_handler: Option<FaultHandler>,
    slow_reported: bool,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        callback: Callback,
        interval: Duration,
        slow_threshold: Duration,
        fault_policy: FaultPolicy,
        fault_handler: Option<FaultHandler>,
    ) -> Self {
        Self {
            shared,
            callback,
            interval,
            slow_threshold,
            fault_policy,
            fault_handler,
            slow_reported: false,
        }
    }

    /// Thread entry point. Returns once `Control::Stop` arrives or the
    /// control channel closes.
    pub(crate) fn run(
        self,
        runtime: Runtime,
        first_deadline: Instant,
        control: UnboundedReceiver<Control>,
    ) {
        let _exit = ExitGuard(self.shared.clone());
        debug!("Periodic worker started ({:?} interval)", self.interval);
        runtime.block_on(self.drive(first_deadline, control));
        drop(runtime);
        debug!("Periodic worker finished");
    }

    async fn drive(mut self, first_deadline: Instant, mut control: UnboundedReceiver<Control>) {
        let mut next_deadline = Some(first_deadline);

        loop {
            let command = match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        // Pending control messages win over an expiry that raced with them.
                        biased;
                        command = control.recv() => command,
                        () = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                            next_deadline = self.on_expiry(deadline);
                            continue;
                        }
                    }
                }
                None => control.recv().await,
            };

            match command {
                Some(Control::Pause) => {
                    debug!("Pending wait cancelled (pause)");
                    next_deadline = None;
                }
                Some(Control::Resume { deadline }) => {
                    debug!("Re-armed after resume");
                    next_deadline = Some(deadline);
                }
                Some(Control::Stop) | None => {
                    debug!("Pending wait cancelled (stop)");
                    break;
                }
            }
        }
    }

    /// Timer-fire handler. Returns the deadline to re-arm with, or `None`
    /// when the firing counts as cancelled.
    fn on_expiry(&mut self, deadline: Instant) -> Option<Instant> {
        let state = self.shared.state.load();
        if state != ExecutorState::Armed {
            debug!("Timer expired while {}, not re-arming", state);
            return None;
        }

        if !self.dispatch(deadline) {
            return None;
        }

        let next = deadline_after(deadline, self.interval);
        if next.is_none() {
            error!("Next deadline overflows the monotonic clock, timer left disarmed");
        }
        next
    }

    /// Runs the callback once. Returns false if the fault policy paused the executor.
    fn dispatch(&mut self, deadline: Instant) -> bool {
        let fired_at = Instant::now();
        let lateness = fired_at.saturating_duration_since(deadline);

        let callback = &mut self.callback;
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback()));
        let duration = fired_at.elapsed();

        let (tick, consistently_slow) = {
            let mut stats = self.shared.stats();
            stats.record_tick(fired_at, lateness, duration);
            (stats.ticks, stats.metrics.is_consistently_slow())
        };

        if duration > self.interval {
            warn!(
                "Callback took {:?} (longer than interval {:?}), next tick fires late",
                duration, self.interval
            );
        }
        if consistently_slow && !self.slow_reported {
            warn!(
                "Callback consistently slower than {:?}, ticks are being delayed",
                self.slow_threshold
            );
        }
        self.slow_reported = consistently_slow;

        let Err(payload) = result else {
            return true;
        };

        let fault = CallbackFault::from_panic(tick, &*payload);
        error!("{}", fault);
        self.shared.stats().record_fault(fault.clone());
        if let Some(handler) = &self.fault_handler {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&fault))) {
                error!(
                    "Fault handler panicked on tick {}: {}",
                    tick,
                    panic_message(&*payload)
                );
            }
        }

        match self.fault_policy {
            FaultPolicy::Continue => true,
            FaultPolicy::Pause => {
                if self
                    .shared
                    .state
                    .transition(ExecutorState::Armed, ExecutorState::Paused)
                {
                    warn!("Executor paused after callback fault on tick {}", tick);
                }
                // Either we paused, or the owner already moved the state on.
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::metrics::TaskMetrics;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fail(message: &str) {
        panic!("{}", message);
    }

    fn shared_armed() -> Arc<Shared> {
        let shared = Arc::new(Shared::default());
        *shared.stats() = ExecutorStats::new(TaskMetrics::new(4, Duration::from_millis(10)));
        shared.state.store(ExecutorState::Armed);
        shared
    }

    fn worker(shared: Arc<Shared>, callback: Callback, policy: FaultPolicy) -> Worker {
        Worker::new(
            shared,
            callback,
            Duration::from_millis(10),
            Duration::from_millis(10),
            policy,
            None,
        )
    }

    #[test]
    fn test_expiry_advances_from_previous_deadline() {
        let shared = shared_armed();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut worker = worker(
            shared.clone(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            FaultPolicy::Continue,
        );

        // A deadline well in the past: the next one is still deadline + interval.
        let deadline = Instant::now() - Duration::from_millis(500);
        let next = worker.on_expiry(deadline);

        assert_eq!(next, Some(deadline + Duration::from_millis(10)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = shared.stats();
        assert_eq!(stats.ticks, 1);
        assert!(stats.max_lateness >= Duration::from_millis(500));
    }

    #[test]
    fn test_expiry_while_paused_is_cancelled() {
        let shared = shared_armed();
        shared.state.store(ExecutorState::Paused);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut worker = worker(
            shared.clone(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            FaultPolicy::Continue,
        );

        assert_eq!(worker.on_expiry(Instant::now()), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(shared.stats().ticks, 0);
    }

    #[test]
    fn test_panicking_callback_is_recorded_and_rearmed() {
        let shared = shared_armed();
        let mut worker = worker(
            shared.clone(),
            Box::new(|| fail("tick failed")),
            FaultPolicy::Continue,
        );

        let deadline = Instant::now();
        assert_eq!(
            worker.on_expiry(deadline),
            Some(deadline + Duration::from_millis(10))
        );

        let stats = shared.stats();
        assert_eq!(stats.faults, 1);
        let fault = stats.last_fault.clone().unwrap();
        assert_eq!(fault.tick, 1);
        assert_eq!(fault.message, "tick failed");
    }

    #[test]
    fn test_pause_policy_disarms_after_fault() {
        let shared = shared_armed();
        let mut worker = worker(
            shared.clone(),
            Box::new(|| fail("tick failed")),
            FaultPolicy::Pause,
        );

        assert_eq!(worker.on_expiry(Instant::now()), None);
        assert_eq!(shared.state.load(), ExecutorState::Paused);
    }

    #[test]
    fn test_fault_handler_receives_fault() {
        let shared = shared_armed();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: FaultHandler = Arc::new(move |fault: &CallbackFault| {
            sink.lock().unwrap().push(fault.message.clone());
        });
        let mut worker = Worker::new(
            shared,
            Box::new(|| fail("handler sees this")),
            Duration::from_millis(10),
            Duration::from_millis(10),
            FaultPolicy::Continue,
            Some(handler),
        );

        worker.on_expiry(Instant::now());
        assert_eq!(*seen.lock().unwrap(), vec!["handler sees this".to_string()]);
    }

    #[test]
    fn test_panicking_fault_handler_does_not_stop_ticks() {
        let shared = shared_armed();
        let handler: FaultHandler = Arc::new(|fault: &CallbackFault| fail(&fault.message));
        let mut worker = Worker::new(
            shared.clone(),
            Box::new(|| fail("tick failed")),
            Duration::from_millis(10),
            Duration::from_millis(10),
            FaultPolicy::Continue,
            Some(handler),
        );

        let first = Instant::now();
        let second = worker.on_expiry(first).unwrap();
        assert_eq!(second, first + Duration::from_millis(10));
        assert_eq!(
            worker.on_expiry(second),
            Some(second + Duration::from_millis(10))
        );

        assert_eq!(shared.state.load(), ExecutorState::Armed);
        assert_eq!(shared.stats().faults, 2);
    }

    #[test]
    fn test_exit_marks_stopping_worker_idle() {
        let shared = shared_armed();
        shared.state.store(ExecutorState::Stopping);
        drop(ExitGuard(shared.clone()));
        assert_eq!(shared.state.load(), ExecutorState::Idle);

        // A cycle started after the old worker finished is left alone.
        shared.state.store(ExecutorState::Armed);
        drop(ExitGuard(shared.clone()));
        assert_eq!(shared.state.load(), ExecutorState::Armed);
    }

    #[test]
    fn test_worker_panic_leaves_executor_stopping() {
        let shared = shared_armed();
        let guarded = shared.clone();
        let result = thread::spawn(move || {
            let _exit = ExitGuard(guarded);
            fail("worker died");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(shared.state.load(), ExecutorState::Stopping);
        assert!(!shared.state.load().is_running());
    }
}
