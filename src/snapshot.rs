//! Results snapshot persistence
//!
//! A snapshot is the full result set plus the run environment, written as a
//! single JSON object that replaces the previous file. Writes go to a
//! sibling temp file first and are renamed into place, so a crash mid-write
//! leaves the last complete snapshot behind.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::console::Console;
use crate::environment::RunConfig;
use crate::error::{Result, SweepError};
use crate::runner::CompletionHook;
use crate::store::ResultStore;
use crate::types::JobRecord;

/// Contents of `results.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub config: RunConfig,
    pub results: Vec<JobRecord>,
}

impl Snapshot {
    /// Read a snapshot file back.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            SweepError::snapshot(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Serialize and atomically replace `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string(self)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| {
            SweepError::snapshot(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            SweepError::snapshot(format!("Failed to replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

/// Writes the current store contents to the results file
#[derive(Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
    config: RunConfig,
    store: Arc<ResultStore>,
    console: Console,
    /// Serializes writers so a slow background write cannot land after a newer one
    write_lock: Arc<Mutex<()>>,
}

impl SnapshotWriter {
    pub fn new(
        path: impl Into<PathBuf>,
        config: RunConfig,
        store: Arc<ResultStore>,
        console: Console,
    ) -> Self {
        Self {
            path: path.into(),
            config,
            store,
            console,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write the snapshot and wait for it to land.
    pub fn write(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.store.snapshot(&self.config);
        snapshot.save(&self.path)?;
        tracing::debug!(
            "Wrote {} result(s) to {}",
            snapshot.results.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Write the snapshot, reporting a failure on the console instead of
    /// returning it.
    pub fn write_or_report(&self) -> bool {
        match self.write() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Snapshot write failed: {}", e);
                self.console.line(format!("{}", e));
                false
            }
        }
    }

    /// Write the snapshot on a background thread.
    pub fn write_in_background(&self) -> thread::JoinHandle<bool> {
        let writer = self.clone();
        thread::spawn(move || writer.write_or_report())
    }
}

/// Completion hook that snapshots every `every` completed jobs
///
/// The write runs in the background; the summary is printed right away.
pub struct PeriodicSnapshot {
    every: usize,
    writer: SnapshotWriter,
    console: Console,
}

impl PeriodicSnapshot {
    /// `every` is clamped to at least 1.
    pub fn new(every: usize, writer: SnapshotWriter, console: Console) -> Self {
        Self {
            every: every.max(1),
            writer,
            console,
        }
    }

    /// Whether the `completed`-th completion triggers a snapshot.
    pub fn is_due(&self, completed: usize) -> bool {
        completed > 0 && completed % self.every == 0
    }
}

impl CompletionHook for PeriodicSnapshot {
    fn on_complete(&self, completed: usize, _record: &JobRecord) {
        if self.is_due(completed) {
            tracing::debug!("Periodic snapshot after {} completion(s)", completed);
            self.writer.write_in_background();
            self.console.block(self.writer.store.summarize().to_string());
        }
    }
}
