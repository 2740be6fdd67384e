//! native-sweep library
//!
//! Batch-installs a list of native packages, classifies every outcome, logs
//! unrecognised failures and keeps a resumable results snapshot, while
//! answering keyboard commands without pausing the queue.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod console;
pub mod control;
pub mod environment;
pub mod error;
pub mod failure_log;
pub mod input;
pub mod installer;
pub mod package_list;
pub mod process_guard;
pub mod resume;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use classifier::{Classification, KNOWN_ISSUES, KnownIssue, classify};
pub use config::SweepConfig;
pub use console::Console;
pub use control::{ControlCommand, Controller, Event, Flow};
pub use environment::RunConfig;
pub use error::SweepError;
pub use failure_log::FailureLog;
pub use installer::{CommandTemplate, InstallOutput, PackageInstaller, ShellInstaller};
pub use runner::{CompletionHook, RunHandle, Runner};
pub use snapshot::{PeriodicSnapshot, Snapshot, SnapshotWriter};
pub use store::{ResultStore, Summary};
pub use types::{JobRecord, OutcomeKind};
