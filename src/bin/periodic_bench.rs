//! Jitter benchmark for the periodic executor
//!
//! Runs one executor at a short interval, records every invocation, and
//! writes per-tick jitter and phase error to a CSV file.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};
use periodic_executor::jitter::{JitterReport, TickRecorder, run_naive};
use periodic_executor::logging::init_logging;
use periodic_executor::{ExecutorConfig, PeriodicExecutor};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "periodic-bench")]
#[command(version = "1.0")]
#[command(about = "Measures jitter and phase error of a periodic executor", long_about = None)]
struct BenchArgs {
    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 1)]
    interval_ms: u64,

    /// How long to run the executor
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// CSV output path
    #[arg(short, long, default_value = "jitter.csv")]
    output: PathBuf,

    /// Executor config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated work per tick, in microseconds
    #[arg(long, default_value_t = 0)]
    work_us: u64,

    /// Also run the naive sleep-after-callback loop for comparison
    #[arg(long)]
    naive: bool,
}

/// Upper bound on preallocated tick slots; longer runs grow the vector on demand.
const MAX_PREALLOCATED_TICKS: usize = 1 << 20;

fn tick_capacity(duration: Duration, interval: Duration) -> usize {
    let expected = duration.as_nanos() / interval.as_nanos().max(1);
    usize::try_from(expected)
        .unwrap_or(usize::MAX)
        .saturating_add(16)
        .min(MAX_PREALLOCATED_TICKS)
}

fn naive_output_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jitter".to_string());
    output.with_file_name(format!("{}-naive.csv", stem))
}

fn simulate_work(work: Duration) {
    if !work.is_zero() {
        thread::sleep(work);
    }
}

fn main() -> Result<()> {
    init_logging(LevelFilter::Warn);
    let args = BenchArgs::parse();

    let config = match &args.config {
        Some(path) => ExecutorConfig::load_from_file(path)?,
        None => ExecutorConfig::default().with_thread_name("periodic-bench"),
    };
    let interval = Duration::from_millis(args.interval_ms);
    if interval.is_zero() {
        bail!("--interval-ms must be greater than zero");
    }
    let duration = Duration::from_secs(args.duration_secs);
    let work = Duration::from_micros(args.work_us);

    let capacity = tick_capacity(duration, interval);
    let recorder = TickRecorder::with_capacity(capacity);

    let executor = PeriodicExecutor::with_config(config);
    let ticks = recorder.clone();
    executor
        .try_start(interval, move || {
            ticks.record();
            simulate_work(work);
        })
        .context("Failed to start executor")?;
    info!("Benchmark running for {:?} at {:?} interval", duration, interval);

    thread::sleep(duration);
    executor.stop();

    let report = JitterReport::from_ticks(interval, &recorder.snapshot());
    report.save_csv(&args.output)?;
    let stats = executor.stats();

    println!("Drift-corrected executor, {:?} interval", interval);
    println!("{}", report.summary);
    println!("Max lateness: {:?}", stats.max_lateness);
    println!(
        "Average callback time (last {} ticks): {:?}",
        stats.metrics.recent_durations.len(),
        stats.metrics.average_duration()
    );
    println!("Callback faults: {}", stats.faults);
    println!("Wrote {}", args.output.display());

    if args.naive {
        let naive_recorder = TickRecorder::with_capacity(capacity);
        run_naive(interval, duration, || {
            naive_recorder.record();
            simulate_work(work);
        });

        let naive_report = JitterReport::from_ticks(interval, &naive_recorder.snapshot());
        let naive_path = naive_output_path(&args.output);
        naive_report.save_csv(&naive_path)?;

        println!();
        println!("Naive sleep loop, {:?} interval", interval);
        println!("{}", naive_report.summary);
        println!("Wrote {}", naive_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_output_path() {
        assert_eq!(
            naive_output_path(Path::new("out/jitter.csv")),
            PathBuf::from("out/jitter-naive.csv")
        );
    }

    #[test]
    fn test_tick_capacity_is_clamped() {
        assert_eq!(
            tick_capacity(Duration::from_secs(10), Duration::from_millis(1)),
            10_016
        );
        assert_eq!(
            tick_capacity(Duration::from_secs(u64::MAX), Duration::from_nanos(1)),
            MAX_PREALLOCATED_TICKS
        );
    }

    #[test]
    fn test_args_defaults() {
        let args = BenchArgs::parse_from(["periodic-bench"]);
        assert_eq!(args.interval_ms, 1);
        assert_eq!(args.duration_secs, 10);
        assert_eq!(args.output, PathBuf::from("jitter.csv"));
        assert!(!args.naive);
    }
}
