//! Jitter and phase-error measurement for periodic callbacks
//!
//! [`TickRecorder`] collects invocation timestamps from inside a callback,
//! [`JitterReport`] turns them into per-tick rows and summary statistics,
//! and [`run_naive`] provides the "sleep one interval after each callback"
//! baseline that drift-free scheduling is compared against.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub const CSV_HEADER: &str = "tick,elapsed_ns,interval_ns,jitter_ns,phase_error_ns";

/// Thread-safe list of tick timestamps, cheap to clone into a callback.
#[derive(Debug, Clone, Default)]
pub struct TickRecorder {
    ticks: Arc<Mutex<Vec<Instant>>>,
}

impl TickRecorder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ticks: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
        }
    }

    pub fn record(&self) {
        let now = Instant::now();
        self.ticks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(now);
    }

    pub fn len(&self) -> usize {
        self.ticks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Instant> {
        self.ticks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One row of the report. `interval_ns` and `jitter_ns` are absent for the first tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSample {
    pub tick: u64,
    /// Time since the first tick.
    pub elapsed_ns: u64,
    pub interval_ns: Option<u64>,
    /// |measured interval - configured interval|
    pub jitter_ns: Option<u64>,
    /// Actual time minus `first_tick + tick * interval`.
    pub phase_error_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JitterSummary {
    pub count: usize,
    pub mean_interval_ns: f64,
    pub mean_jitter_ns: f64,
    pub max_jitter_ns: u64,
    pub jitter_stddev_ns: f64,
    /// Average drift: mean |phase error| over all ticks.
    pub mean_abs_phase_error_ns: f64,
    pub max_abs_phase_error_ns: u64,
    pub final_phase_error_ns: i64,
}

impl std::fmt::Display for JitterSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total executions: {}", self.count)?;
        writeln!(f, "Mean interval: {:.0} ns", self.mean_interval_ns)?;
        writeln!(f, "Mean jitter: {:.0} ns", self.mean_jitter_ns)?;
        writeln!(f, "Max jitter: {} ns", self.max_jitter_ns)?;
        writeln!(f, "Jitter std-dev: {:.0} ns", self.jitter_stddev_ns)?;
        writeln!(f, "Average drift: {:.0} ns", self.mean_abs_phase_error_ns)?;
        writeln!(f, "Max |phase error|: {} ns", self.max_abs_phase_error_ns)?;
        write!(f, "Final phase error: {} ns", self.final_phase_error_ns)
    }
}

#[derive(Debug, Clone)]
pub struct JitterReport {
    pub interval: Duration,
    pub samples: Vec<TickSample>,
    pub summary: JitterSummary,
}

impl JitterReport {
    /// Builds a report from tick timestamps in invocation order, anchored at the first tick.
    pub fn from_ticks(interval: Duration, ticks: &[Instant]) -> Self {
        let interval_ns = duration_ns(interval);
        let mut samples = Vec::with_capacity(ticks.len());

        if let Some(&first) = ticks.first() {
            let mut previous = first;
            for (index, &at) in ticks.iter().enumerate() {
                let elapsed_ns = duration_ns(at.saturating_duration_since(first));
                let ideal_ns = (index as u64).saturating_mul(interval_ns);
                let measured = (index > 0).then(|| duration_ns(at.saturating_duration_since(previous)));

                samples.push(TickSample {
                    tick: index as u64,
                    elapsed_ns,
                    interval_ns: measured,
                    jitter_ns: measured.map(|m| m.abs_diff(interval_ns)),
                    phase_error_ns: signed_diff(elapsed_ns, ideal_ns),
                });
                previous = at;
            }
        }

        let summary = summarize(&samples);
        Self {
            interval,
            samples,
            summary,
        }
    }

    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", CSV_HEADER)?;
        for sample in &self.samples {
            writeln!(
                writer,
                "{},{},{},{},{}",
                sample.tick,
                sample.elapsed_ns,
                optional(sample.interval_ns),
                optional(sample.jitter_ns),
                sample.phase_error_ns
            )?;
        }
        writer.flush()
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_csv(BufWriter::new(file))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Naive scheduling baseline: sleeps one full interval after every callback
/// until `run_for` has elapsed. Each callback's latency shifts every later tick.
pub fn run_naive<F: FnMut()>(interval: Duration, run_for: Duration, mut callback: F) -> u64 {
    let started = Instant::now();
    let mut invocations = 0;
    loop {
        thread::sleep(interval);
        if started.elapsed() >= run_for {
            break;
        }
        callback();
        invocations += 1;
    }
    invocations
}

fn summarize(samples: &[TickSample]) -> JitterSummary {
    let intervals: Vec<u64> = samples.iter().filter_map(|s| s.interval_ns).collect();
    let jitters: Vec<u64> = samples.iter().filter_map(|s| s.jitter_ns).collect();
    let phase_errors: Vec<u64> = samples
        .iter()
        .map(|s| s.phase_error_ns.unsigned_abs())
        .collect();

    let mean_jitter_ns = mean(&jitters);
    let variance = if jitters.is_empty() {
        0.0
    } else {
        jitters
            .iter()
            .map(|&j| (j as f64 - mean_jitter_ns).powi(2))
            .sum::<f64>()
            / jitters.len() as f64
    };

    JitterSummary {
        count: samples.len(),
        mean_interval_ns: mean(&intervals),
        mean_jitter_ns,
        max_jitter_ns: jitters.iter().copied().max().unwrap_or(0),
        jitter_stddev_ns: variance.sqrt(),
        mean_abs_phase_error_ns: mean(&phase_errors),
        max_abs_phase_error_ns: phase_errors.iter().copied().max().unwrap_or(0),
        final_phase_error_ns: samples.last().map(|s| s.phase_error_ns).unwrap_or(0),
    }
}

fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn signed_diff(actual: u64, ideal: u64) -> i64 {
    let diff = i128::from(actual) - i128::from(ideal);
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

fn optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
