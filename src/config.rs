//! Run configuration.
//!
//! [`IngestConfig`] carries the knobs of the pipeline itself. The per-run
//! facts (chip generation and clock reference) come from the run directory's
//! `run_info.json`, parsed into a [`RunDescriptor`] and turned into the
//! [`RunContext`] every task borrows.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::chip::ChipGeneration;
use crate::error::ConfigurationDefect;
use crate::timebase::{RunBounds, TimeBaseReconciler, TimeBaseReference};

/// Name of the run descriptor inside a run directory.
pub const RUN_DESCRIPTOR_FILE: &str = "run_info.json";

/// Default name of the SQLite store inside `<run_dir>/sqlite/`.
pub const DEFAULT_STORE_NAME: &str = "device_trace.db";

/// How the store is opened and how hard a commit is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    /// Extra attempts after the first failed commit.
    pub commit_retries: u32,
    /// Sleep before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            commit_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Number of engine tasks decoded at the same time.
    pub workers: usize,
    /// Cancel the run once more than this many tasks have failed.
    pub error_budget: Option<usize>,
    pub store_name: String,
    pub store: StoreOptions,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            error_budget: None,
            store_name: DEFAULT_STORE_NAME.to_string(),
            store: StoreOptions::default(),
        }
    }
}

impl IngestConfig {
    /// Path of the store for a run directory.
    pub fn store_path(&self, run_dir: &Path) -> PathBuf {
        run_dir.join("sqlite").join(&self.store_name)
    }
}

/// The run-level descriptor written next to the trace files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub chip: ChipGeneration,
    pub reference_cycle_count: u64,
    pub reference_wall_time_ns: i64,
    pub cycles_per_microsecond: f64,
    #[serde(default)]
    pub run_start_ns: Option<i64>,
    #[serde(default)]
    pub run_end_ns: Option<i64>,
}

impl RunDescriptor {
    /// Load `run_info.json` from a run directory.
    pub fn load(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(RUN_DESCRIPTOR_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn bounds(&self) -> Option<RunBounds> {
        match (self.run_start_ns, self.run_end_ns) {
            (Some(start_ns), Some(end_ns)) => Some(RunBounds { start_ns, end_ns }),
            _ => None,
        }
    }

    pub fn reference(&self) -> TimeBaseReference {
        TimeBaseReference {
            reference_cycle_count: self.reference_cycle_count,
            reference_wall_time_ns: self.reference_wall_time_ns,
            cycles_per_microsecond: self.cycles_per_microsecond,
        }
    }
}

/// Everything a task needs to know about the run. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_dir: PathBuf,
    pub chip: ChipGeneration,
    pub reconciler: TimeBaseReconciler,
    pub store_path: PathBuf,
}

impl RunContext {
    pub fn new(
        run_dir: &Path,
        descriptor: &RunDescriptor,
        config: &IngestConfig,
    ) -> Result<Self, ConfigurationDefect> {
        let reconciler = TimeBaseReconciler::new(descriptor.reference(), descriptor.bounds())?;
        Ok(Self {
            run_dir: run_dir.to_path_buf(),
            chip: descriptor.chip,
            reconciler,
            store_path: config.store_path(run_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_descriptor() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(RUN_DESCRIPTOR_FILE),
            r#"{
                "chip": "gen4",
                "reference_cycle_count": 1000,
                "reference_wall_time_ns": 5000000000,
                "cycles_per_microsecond": 38.4,
                "run_start_ns": 4000000000,
                "run_end_ns": 6000000000
            }"#,
        )
        .unwrap();

        let descriptor = RunDescriptor::load(dir.path()).unwrap();
        assert_eq!(descriptor.chip, ChipGeneration::Gen4);
        assert_eq!(
            descriptor.bounds(),
            Some(RunBounds {
                start_ns: 4_000_000_000,
                end_ns: 6_000_000_000
            })
        );

        let config = IngestConfig::default();
        let ctx = RunContext::new(dir.path(), &descriptor, &config).unwrap();
        assert_eq!(ctx.reconciler.to_wall_time_ns(1000), 5_000_000_000);
        assert_eq!(
            ctx.store_path,
            dir.path().join("sqlite").join(DEFAULT_STORE_NAME)
        );
    }

    #[test]
    fn test_bounds_are_optional() {
        let descriptor: RunDescriptor = serde_json::from_str(
            r#"{"chip": "gen1", "reference_cycle_count": 0,
                "reference_wall_time_ns": 0, "cycles_per_microsecond": 50.0}"#,
        )
        .unwrap();
        assert_eq!(descriptor.bounds(), None);
    }

    #[test]
    fn test_missing_descriptor() {
        let dir = TempDir::new().unwrap();
        assert!(RunDescriptor::load(dir.path()).is_err());
    }

    #[test]
    fn test_bad_frequency_is_a_defect() {
        let descriptor = RunDescriptor {
            chip: ChipGeneration::Gen2,
            reference_cycle_count: 0,
            reference_wall_time_ns: 0,
            cycles_per_microsecond: 0.0,
            run_start_ns: None,
            run_end_ns: None,
        };
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RunContext::new(dir.path(), &descriptor, &IngestConfig::default()),
            Err(ConfigurationDefect::BadFrequency(_))
        ));
    }
}
