//! Periodic executor demo
//!
//! Runs three independent executors (50ms, 200ms and 1s), pauses the 200ms
//! one for a while, then stops everything and prints the final counts.

use anyhow::{Context, Result};
use clap::{Arg, Command, value_parser};
use log::{LevelFilter, info};
use periodic_executor::PeriodicExecutor;
use periodic_executor::logging::init_logging;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

const DEFAULT_RUN_SECS: u64 = 10;
const DEFAULT_PAUSE_AFTER_SECS: u64 = 5;
const DEFAULT_PAUSE_SECS: u64 = 2;

fn counting_task(label: &'static str, counter: Arc<AtomicU64>) -> impl FnMut() + Send + 'static {
    move || {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        println!("Task {} executed. Count: {}", label, count);
    }
}

/// Sleeps for `duration` unless Ctrl-C arrives first. Returns true when interrupted.
fn wait_or_interrupt(shutdown: &Receiver<()>, duration: Duration) -> bool {
    match shutdown.recv_timeout(duration) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

fn command() -> Command {
    Command::new("Periodic executor demo")
        .version("1.0")
        .about("Runs three periodic executors and pauses one of them")
        .arg(
            Arg::new("run-secs")
                .long("run-secs")
                .value_name("SECS")
                .help(format!("Total run time [default: {}]", DEFAULT_RUN_SECS))
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("pause-after-secs")
                .long("pause-after-secs")
                .value_name("SECS")
                .help(format!(
                    "When to pause the 200ms task [default: {}]",
                    DEFAULT_PAUSE_AFTER_SECS
                ))
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("pause-secs")
                .long("pause-secs")
                .value_name("SECS")
                .help(format!(
                    "How long the 200ms task stays paused [default: {}]",
                    DEFAULT_PAUSE_SECS
                ))
                .value_parser(value_parser!(u64)),
        )
}

/// Seconds left to run once the pause window is over.
fn remaining_secs(run_secs: u64, pause_after_secs: u64, pause_secs: u64) -> u64 {
    run_secs.saturating_sub(pause_after_secs.saturating_add(pause_secs))
}

fn main() -> Result<()> {
    init_logging(LevelFilter::Info);

    let matches = command().get_matches();
    let secs = |name: &str, default: u64| matches.get_one::<u64>(name).copied().unwrap_or(default);
    let run_secs = secs("run-secs", DEFAULT_RUN_SECS);
    let pause_after_secs = secs("pause-after-secs", DEFAULT_PAUSE_AFTER_SECS);
    let pause_secs = secs("pause-secs", DEFAULT_PAUSE_SECS);

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("Error setting Ctrl-C handler")?;

    let executor_a = PeriodicExecutor::new();
    let executor_b = PeriodicExecutor::new();
    let executor_c = PeriodicExecutor::new();

    let count_a = Arc::new(AtomicU64::new(0));
    let count_b = Arc::new(AtomicU64::new(0));
    let count_c = Arc::new(AtomicU64::new(0));

    info!("Starting the periodic executors...");
    executor_a.try_start(Duration::from_millis(50), counting_task("A (50ms)", count_a.clone()))?;
    executor_b.try_start(Duration::from_millis(200), counting_task("B (200ms)", count_b.clone()))?;
    executor_c.try_start(Duration::from_secs(1), counting_task("C (1s)", count_c.clone()))?;
    info!("All executors started, running for {} seconds", run_secs);

    let run_demo = || {
        if wait_or_interrupt(&shutdown_rx, Duration::from_secs(pause_after_secs)) {
            return;
        }
        println!("\n--- PAUSING Task B for {} seconds ---\n", pause_secs);
        executor_b.pause();

        if wait_or_interrupt(&shutdown_rx, Duration::from_secs(pause_secs)) {
            return;
        }
        println!("\n--- RESUMING Task B ---\n");
        executor_b.resume();

        let remaining = remaining_secs(run_secs, pause_after_secs, pause_secs);
        wait_or_interrupt(&shutdown_rx, Duration::from_secs(remaining));
    };
    run_demo();

    info!("Stopping the periodic executors...");
    executor_a.stop();
    executor_b.stop();
    executor_c.stop();

    println!("Executors stopped.");
    println!("Final count for Task A (50ms): {}", count_a.load(Ordering::SeqCst));
    println!("Final count for Task B (200ms): {}", count_b.load(Ordering::SeqCst));
    println!("Final count for Task C (1s): {}", count_c.load(Ordering::SeqCst));

    Ok(())
}
