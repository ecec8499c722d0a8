//! Per-cycle tick statistics for a periodic executor

use crate::error::CallbackFault;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling window of recent callback durations
#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub recent_durations: VecDeque<Duration>,
    pub max_recent_durations: usize,
    pub slow_threshold: Duration,
}

impl TaskMetrics {
    pub fn new(max_recent: usize, slow_threshold: Duration) -> Self {
        let max_recent = max_recent.max(1);
        Self {
            recent_durations: VecDeque::with_capacity(max_recent),
            max_recent_durations: max_recent,
            slow_threshold,
        }
    }

    pub fn add_duration(&mut self, duration: Duration) {
        if self.recent_durations.len() >= self.max_recent_durations {
            self.recent_durations.pop_front();
        }
        self.recent_durations.push_back(duration);
    }

    pub fn is_consistently_slow(&self) -> bool {
        if self.recent_durations.len() < 3 {
            return false;
        }

        self.recent_durations
            .iter()
            .all(|&d| d > self.slow_threshold)
    }

    pub fn average_duration(&self) -> Duration {
        if self.recent_durations.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.recent_durations.iter().sum();
        total / self.recent_durations.len() as u32
    }
}

/// Snapshot of what happened during the current `start`-`stop` cycle
#[derive(Debug, Clone)]
pub struct ExecutorStats {
    /// Completed invocations, including ones that panicked.
    pub ticks: u64,
    pub faults: u64,
    pub total_duration: Duration,
    pub last_tick: Option<Instant>,
    /// Largest observed delay between an ideal deadline and the actual firing.
    pub max_lateness: Duration,
    pub last_fault: Option<CallbackFault>,
    pub metrics: TaskMetrics,
}

impl ExecutorStats {
    pub fn new(metrics: TaskMetrics) -> Self {
        Self {
            ticks: 0,
            faults: 0,
            total_duration: Duration::ZERO,
            last_tick: None,
            max_lateness: Duration::ZERO,
            last_fault: None,
            metrics,
        }
    }

    pub(crate) fn record_tick(&mut self, fired_at: Instant, lateness: Duration, duration: Duration) {
        self.ticks += 1;
        self.last_tick = Some(fired_at);
        self.total_duration += duration;
        self.max_lateness = self.max_lateness.max(lateness);
        self.metrics.add_duration(duration);
    }

    pub(crate) fn record_fault(&mut self, fault: CallbackFault) {
        self.faults += 1;
        self.last_fault = Some(fault);
    }
}

impl Default for ExecutorStats {
    fn default() -> Self {
        Self::new(TaskMetrics::new(1, Duration::ZERO))
    }
}
