//! Drift-free periodic execution on a dedicated background thread
//!
//! ```no_run
//! use periodic_executor::PeriodicExecutor;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! let executor = PeriodicExecutor::new();
//! let count = Arc::new(AtomicU32::new(0));
//! let ticks = count.clone();
//! executor.start(Duration::from_millis(100), move || {
//!     ticks.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! std::thread::sleep(Duration::from_millis(550));
//! executor.pause();
//! executor.resume();
//! executor.stop();
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod jitter;
pub mod logging;

pub use config::{ExecutorConfig, FaultPolicy};
pub use error::{CallbackFault, ExecutorError};
pub use executor::{ExecutorState, ExecutorStats, PeriodicExecutor, TaskMetrics};
