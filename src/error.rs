//! Error types reported by the periodic executor.

use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Reasons a `start` request can be refused.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("executor is already running")]
    AlreadyRunning,

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("interval {0:?} overflows the monotonic clock")]
    IntervalOverflow(Duration),

    #[error("failed to build timer runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// A panic caught at the callback boundary.
///
/// The worker survives the panic; the fault is recorded in the executor
/// statistics and forwarded to the handler registered with
/// [`PeriodicExecutor::on_fault`](crate::PeriodicExecutor::on_fault).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("callback panicked on tick {tick}: {message}")]
pub struct CallbackFault {
    /// 1-based index of the invocation that panicked.
    pub tick: u64,
    pub message: String,
    pub at: Instant,
}

impl CallbackFault {
    pub(crate) fn from_panic(tick: u64, payload: &(dyn std::any::Any + Send)) -> Self {
        Self {
            tick,
            message: panic_message(payload),
            at: Instant::now(),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
