//! Run configuration
//!
//! Plain settings struct built from the command line. Defaults reproduce the
//! classic single-worker sweep: `native-packages.json` in, `results.json` and
//! `log.txt` out, a snapshot every 50 installs.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SweepError};
use crate::installer::CommandTemplate;

/// Default periodic snapshot interval
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Settings for one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// JSON array of package identifiers
    pub packages_path: PathBuf,
    /// Snapshot file, replaced on every write
    pub results_path: PathBuf,
    /// Append-only failure log
    pub log_path: PathBuf,
    /// Maximum concurrent installs
    pub jobs: usize,
    /// Snapshot after every `batch_size` completed installs
    pub batch_size: usize,
    pub command: CommandTemplate,
    /// Per-install time limit; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// How long Quit waits for running installs
    pub quit_grace: Duration,
    pub exit_on_drain: bool,
    /// Continue from an existing results file
    pub resume: bool,
    /// Runtime binary whose version and architecture are recorded
    pub runtime: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            packages_path: PathBuf::from("native-packages.json"),
            results_path: PathBuf::from("results.json"),
            log_path: PathBuf::from("log.txt"),
            jobs: 1,
            batch_size: DEFAULT_BATCH_SIZE,
            command: CommandTemplate::default(),
            timeout: None,
            quit_grace: Duration::from_secs(30),
            exit_on_drain: false,
            resume: false,
            runtime: "node".to_string(),
        }
    }
}

impl SweepConfig {
    /// Check values the type system cannot.
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(SweepError::config("--jobs must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(SweepError::config("--batch-size must be at least 1"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(SweepError::config("--timeout must be at least 1 second"));
        }
        if self.runtime.trim().is_empty() {
            return Err(SweepError::config("--runtime must name a binary"));
        }
        if self.results_path == self.log_path {
            return Err(SweepError::config(
                "results file and failure log must be different files",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SweepConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.jobs, 1);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let config = SweepConfig {
            jobs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SweepError::Config(_))));
    }

    #[test]
    fn test_zero_batch_rejected() {
        let config = SweepConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_output_files_rejected() {
        let config = SweepConfig {
            log_path: PathBuf::from("results.json"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
