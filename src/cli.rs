use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{DEFAULT_BATCH_SIZE, SweepConfig};
use crate::error::Result;
use crate::installer::{CommandTemplate, DEFAULT_COMMAND};

/// native-sweep - batch-test native package installs
#[derive(Parser, Debug)]
#[command(name = "native-sweep")]
#[command(about = "Install a list of native packages one by one and classify every outcome")]
#[command(version)]
pub struct Cli {
    /// JSON array of package names to install
    #[arg(long, default_value = "native-packages.json")]
    pub packages: PathBuf,

    /// Results snapshot, overwritten on every write
    #[arg(long, default_value = "results.json")]
    pub results: PathBuf,

    /// Failure log, appended for every unrecognised failure
    #[arg(long, default_value = "log.txt")]
    pub log: PathBuf,

    /// Number of installs to run at the same time
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Write the results file after every N completed installs
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Install command; `{package}` is replaced by the package name
    #[arg(long = "command", default_value = DEFAULT_COMMAND)]
    pub command_template: String,

    /// Give up on a single install after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds Ctrl+C waits for running installs before stopping them
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub quit_grace: u64,

    /// Exit once every package is processed instead of waiting for Ctrl+C
    #[arg(long)]
    pub exit_on_drain: bool,

    /// Keep results already in the results file and skip those packages
    #[arg(long)]
    pub resume: bool,

    /// Runtime whose version and architecture are recorded in the results
    #[arg(long, default_value = "node")]
    pub runtime: String,

    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validated run configuration.
    pub fn to_config(&self) -> Result<SweepConfig> {
        let config = SweepConfig {
            packages_path: self.packages.clone(),
            results_path: self.results.clone(),
            log_path: self.log.clone(),
            jobs: self.jobs,
            batch_size: self.batch_size,
            command: CommandTemplate::parse(self.command_template.clone())?,
            timeout: self.timeout.map(Duration::from_secs),
            quit_grace: Duration::from_secs(self.quit_grace),
            exit_on_drain: self.exit_on_drain,
            resume: self.resume,
            runtime: self.runtime.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Default `tracing` filter for the verbosity level.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
