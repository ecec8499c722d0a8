use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

static DEFAULT_THREAD_NAME: &str = "periodic-executor";
const DEFAULT_METRICS_WINDOW: usize = 16;

/// What the worker does after the callback panics.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Record the fault and keep ticking.
    #[default]
    Continue,
    /// Record the fault and move the executor to the paused state.
    Pause,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Number of recent callback durations kept for slowness detection.
    pub metrics_window: usize,
    /// Callbacks slower than this are reported. Defaults to the interval.
    pub slow_threshold: Option<Duration>,
    pub fault_policy: FaultPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            metrics_window: DEFAULT_METRICS_WINDOW,
            slow_threshold: None,
            fault_policy: FaultPolicy::Continue,
        }
    }
}

impl ExecutorConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Threshold used for a cycle running at `interval`.
    pub fn slow_threshold_for(&self, interval: Duration) -> Duration {
        self.slow_threshold.unwrap_or(interval)
    }

    pub fn metrics_window(&self) -> usize {
        self.metrics_window.max(1)
    }

    pub fn load_from_file(config_file_path: &Path) -> Result<Self> {
        if !config_file_path.exists() {
            return Err(anyhow!(
                "Config file not found: {}",
                config_file_path.display()
            ));
        }
        let data = fs::read_to_string(config_file_path)
            .with_context(|| format!("Failed to read {}", config_file_path.display()))?;
        let config: Self = serde_json::from_str(&data).context("Failed to parse executor config")?;
        if config.metrics_window == 0 {
            warn!("metrics_window of 0 in {} treated as 1", config_file_path.display());
        }
        Ok(config)
    }

    pub fn save_to_file(&self, config_file_path: &Path) -> Result<()> {
        if let Some(parent_path) = config_file_path.parent() {
            if !parent_path.as_os_str().is_empty() {
                fs::create_dir_all(parent_path).context("Failed to create config directory")?;
            }
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_executor_config_default() {
        let config = ExecutorConfig::default();
        assert_eq!(config.thread_name, "periodic-executor");
        assert_eq!(config.metrics_window, 16);
        assert_eq!(config.slow_threshold, None);
        assert_eq!(config.fault_policy, FaultPolicy::Continue);
    }

    #[test]
    fn test_slow_threshold_falls_back_to_interval() {
        let config = ExecutorConfig::default();
        assert_eq!(
            config.slow_threshold_for(Duration::from_millis(100)),
            Duration::from_millis(100)
        );

        let config = config.with_slow_threshold(Duration::from_millis(5));
        assert_eq!(
            config.slow_threshold_for(Duration::from_millis(100)),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_metrics_window_is_never_zero() {
        let config = ExecutorConfig {
            metrics_window: 0,
            ..Default::default()
        };
        assert_eq!(config.metrics_window(), 1);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("executor.json");

        let config = ExecutorConfig::default()
            .with_thread_name("bench-worker")
            .with_fault_policy(FaultPolicy::Pause)
            .with_slow_threshold(Duration::from_millis(2));
        config.save_to_file(&path).unwrap();

        let loaded = ExecutorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("executor.json");
        fs::write(&path, r#"{ "fault_policy": "pause" }"#).unwrap();

        let loaded = ExecutorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.fault_policy, FaultPolicy::Pause);
        assert_eq!(loaded.thread_name, "periodic-executor");
    }

    #[test]
    fn test_missing_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ExecutorConfig::load_from_file(&temp_dir.path().join("missing.json"));
        assert!(result.is_err());
    }
}
