//! Append-only log of unrecognised install failures.
//!
//! Only `Failed` outcomes are logged here; known issues show up in the
//! summary counters alone.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::console::Console;
use crate::error::Result;

const ENTRY_RULE: &str = "=============================";
const ECHO_RULE: &str = "===============================";

/// Failure log file plus console echo
pub struct FailureLog {
    path: PathBuf,
    console: Console,
    /// Keeps entries from concurrent workers whole
    lock: Mutex<()>,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>, console: Console) -> Self {
        Self {
            path: path.into(),
            console,
            lock: Mutex::new(()),
        }
    }

    /// Append an entry and echo the stderr text.
    ///
    /// A failed write is reported on the console and otherwise ignored.
    pub fn append(&self, cmd: &str, stderr: &str, stdout: &str) {
        if let Err(e) = self.write_entry(cmd, stderr, stdout) {
            tracing::warn!("Failed to append to {}: {}", self.path.display(), e);
            self.console
                .line(format!("Failed to write {}: {}", self.path.display(), e));
        }

        self.console.block(format!("{}\n{}\n", ECHO_RULE, stderr));
    }

    fn write_entry(&self, cmd: &str, stderr: &str, stdout: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format_entry(cmd, stderr, stdout).as_bytes())?;
        Ok(())
    }
}

/// One log entry, CRLF-delimited.
pub fn format_entry(cmd: &str, stderr: &str, stdout: &str) -> String {
    format!(
        "\r\n{}\r\nCMD: {}\r\nSTDERR: {}\r\nSTDOUT: {}",
        ENTRY_RULE, cmd, stderr, stdout
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_format() {
        assert_eq!(
            format_entry("npm install x", "boom", "out"),
            "\r\n=============================\r\nCMD: npm install x\r\nSTDERR: boom\r\nSTDOUT: out"
        );
    }

    #[test]
    fn test_append_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "previous run").unwrap();

        let (console, _) = Console::capture();
        let log = FailureLog::new(&path, console);
        log.append("npm install x", "boom", "");
        log.append("npm install y", "bang", "");

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("previous run"));
        assert_eq!(content.matches("CMD: ").count(), 2);
        assert!(content.contains("STDERR: boom"));
        assert!(content.contains("STDERR: bang"));
    }

    #[test]
    fn test_echoes_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let (console, output) = Console::capture();
        let log = FailureLog::new(dir.path().join("log.txt"), console);
        log.append("npm install x", "gyp ERR! stack", "");

        assert_eq!(
            output.contents(),
            "===============================\ngyp ERR! stack\n"
        );
    }

    #[test]
    fn test_echo_stays_whole_under_concurrent_output() {
        let dir = tempfile::tempdir().unwrap();
        let (console, output) = Console::capture();
        let log = std::sync::Arc::new(FailureLog::new(dir.path().join("log.txt"), console.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                let console = console.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        log.append("npm install x", &format!("boom-{}-{}", i, j), "");
                        console.line(format!("progress {}-{}", i, j));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let text = output.contents();
        let lines: Vec<&str> = text.lines().collect();
        let mut echoes = 0;
        for (n, line) in lines.iter().enumerate() {
            if *line == ECHO_RULE {
                echoes += 1;
                assert!(lines[n + 1].starts_with("boom-"), "rule followed by {:?}", lines[n + 1]);
            }
        }
        assert_eq!(echoes, 200);
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (console, output) = Console::capture();
        // A directory cannot be opened for appending.
        let log = FailureLog::new(dir.path(), console);
        log.append("npm install x", "boom", "");

        let text = output.contents();
        assert!(text.contains("Failed to write"));
        assert!(text.contains("boom"));
    }
}
