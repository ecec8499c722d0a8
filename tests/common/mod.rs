#![allow(dead_code)]
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Timing tolerance added to sleeps that wait for a tick to land.
pub const TIME_TOLERANCE: Duration = Duration::from_millis(50);

/// Invocation counter observed from outside the executor.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Callback that increments this counter.
    pub fn task(&self) -> impl FnMut() + Send + 'static + use<> {
        let count = self.0.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}

/// Expected invocation window `[floor(d/i) - 1, ceil(d/i) + 1]`.
pub fn expected_window(run_for: Duration, interval: Duration) -> (u64, u64) {
    let ratio = run_for.as_nanos() as f64 / interval.as_nanos() as f64;
    let low = (ratio.floor() as u64).saturating_sub(1);
    let high = ratio.ceil() as u64 + 1;
    (low, high)
}

/// Polls `condition` every millisecond until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(1));
    }
    condition()
}
