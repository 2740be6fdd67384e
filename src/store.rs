//! In-memory result store
//!
//! Append-only list of [`JobRecord`]s shared by the worker threads, the
//! periodic snapshot hook and the interactive controller. Records are built
//! completely before [`ResultStore::append`] takes the lock, so every reader
//! sees whole records only.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::environment::RunConfig;
use crate::snapshot::Snapshot;
use crate::types::{JobRecord, OutcomeKind};

const SUMMARY_RULE: &str = "========================================";

/// A line of output mentioning "fatal error", including the newlines on
/// both sides. `\r`, U+2028 and U+2029 also end a line.
fn fatal_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("\n[^\n\r\u{2028}\u{2029}]*fatal error[^\n\r\u{2028}\u{2029}]*\n")
            .expect("fatal error pattern is a valid regex")
    })
}

/// First fatal-error line in `stdout`, if any.
///
/// The match is returned verbatim, surrounding newlines included; two lines
/// that differ only in whitespace are different snippets.
pub fn fatal_error_snippet(stdout: &str) -> Option<&str> {
    fatal_error_pattern().find(stdout).map(|m| m.as_str())
}

/// Thread-safe, append-only list of install results
#[derive(Debug, Default)]
pub struct ResultStore {
    records: RwLock<Vec<JobRecord>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished record. No deduplication.
    pub fn append(&self, record: JobRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Seed the store with records from an earlier run.
    pub fn seed(&self, records: impl IntoIterator<Item = JobRecord>) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record for `name` is already present.
    pub fn contains(&self, name: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|r| r.name == name)
    }

    /// Copy of every record appended so far, in append order.
    pub fn records(&self) -> Vec<JobRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count outcomes and fatal-error snippets over the current contents.
    pub fn summarize(&self) -> Summary {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Summary::from_records(&records)
    }

    /// Persistable view of the current contents plus the run environment.
    pub fn snapshot(&self, config: &RunConfig) -> Snapshot {
        Snapshot {
            config: config.clone(),
            results: self.records(),
        }
    }
}

/// Outcome counts and fatal-error frequencies over a set of records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub known_issue: usize,
    pub failed: usize,
    /// Number of records summarized
    pub total: usize,
    /// Distinct fatal-error snippets in first-seen order, with counts
    pub fatal_errors: Vec<(String, usize)>,
}

impl Summary {
    pub fn from_records(records: &[JobRecord]) -> Self {
        let mut summary = Summary {
            total: records.len(),
            ..Default::default()
        };
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in records {
            match record.result {
                OutcomeKind::Passed => summary.passed += 1,
                OutcomeKind::KnownIssue => summary.known_issue += 1,
                OutcomeKind::Failed => summary.failed += 1,
                OutcomeKind::Unassigned => {}
            }

            if let Some(snippet) = fatal_error_snippet(&record.stdout) {
                match index.get(snippet) {
                    Some(&slot) => summary.fatal_errors[slot].1 += 1,
                    None => {
                        index.insert(snippet, summary.fatal_errors.len());
                        summary.fatal_errors.push((snippet.to_string(), 1));
                    }
                }
            }
        }

        summary
    }

    /// Occurrences of an exact snippet.
    pub fn fatal_error_count(&self, snippet: &str) -> usize {
        self.fatal_errors
            .iter()
            .find(|(s, _)| s == snippet)
            .map_or(0, |(_, n)| *n)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", SUMMARY_RULE)?;
        writeln!(f, "unique fatal errors: {}", self.fatal_errors.len())?;
        for (snippet, count) in &self.fatal_errors {
            writeln!(f, "> {} : {}", snippet, count)?;
        }
        writeln!(f, "passed: {}", self.passed)?;
        writeln!(f, "knownIssue: {}", self.known_issue)?;
        writeln!(f, "failed: {}", self.failed)?;
        writeln!(f, "total modules: {}", self.total)?;
        writeln!(f, "{}", SUMMARY_RULE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, result: OutcomeKind, stdout: &str) -> JobRecord {
        JobRecord {
            name: name.to_string(),
            cmd: format!("npm install {}", name),
            stderr: String::new(),
            stdout: stdout.to_string(),
            result,
        }
    }

    #[test]
    fn test_snippet_includes_newlines() {
        let stdout = "gyp info\nfoo fatal error bar\nmore";
        assert_eq!(fatal_error_snippet(stdout), Some("\nfoo fatal error bar\n"));
    }

    #[test]
    fn test_snippet_needs_newline_on_both_sides() {
        assert_eq!(fatal_error_snippet("fatal error at start\n"), None);
        assert_eq!(fatal_error_snippet("x\nfatal error at end"), None);
    }

    #[test]
    fn test_snippet_first_match_only() {
        let stdout = "a\nfirst fatal error\nsecond fatal error\n";
        assert_eq!(fatal_error_snippet(stdout), Some("\nfirst fatal error\n"));
    }

    #[test]
    fn test_snippet_crlf_line_does_not_match() {
        assert_eq!(fatal_error_snippet("a\r\nfoo fatal error\r\nb"), None);
    }

    #[test]
    fn test_summary_counts() {
        let store = ResultStore::new();
        store.append(record("a", OutcomeKind::Passed, ""));
        store.append(record("b", OutcomeKind::KnownIssue, ""));
        store.append(record("c", OutcomeKind::Failed, ""));
        store.append(record("d", OutcomeKind::Failed, ""));

        let summary = store.summarize();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.known_issue, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total, 4);
        assert!(summary.fatal_errors.is_empty());
    }

    #[test]
    fn test_identical_snippets_share_a_key() {
        let store = ResultStore::new();
        store.append(record("a", OutcomeKind::Failed, "x\nfoo fatal error bar\ny"));
        store.append(record("b", OutcomeKind::Failed, "z\nfoo fatal error bar\n"));
        store.append(record("c", OutcomeKind::Failed, "z\nfoo  fatal error bar\n"));

        let summary = store.summarize();
        assert_eq!(summary.fatal_errors.len(), 2);
        assert_eq!(summary.fatal_error_count("\nfoo fatal error bar\n"), 2);
        assert_eq!(summary.fatal_error_count("\nfoo  fatal error bar\n"), 1);
    }

    #[test]
    fn test_summary_display_block() {
        let store = ResultStore::new();
        store.append(record("a", OutcomeKind::Passed, ""));
        store.append(record("b", OutcomeKind::Failed, "\nC1083: fatal error: x.h\n"));

        let text = store.summarize().to_string();
        let expected = "========================================\n\
                        unique fatal errors: 1\n\
                        > \nC1083: fatal error: x.h\n : 1\n\
                        passed: 1\n\
                        knownIssue: 0\n\
                        failed: 1\n\
                        total modules: 2\n\
                        ========================================\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_contains_and_seed() {
        let store = ResultStore::new();
        assert!(store.is_empty());
        store.seed(vec![record("a", OutcomeKind::Passed, "")]);
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert_eq!(store.len(), 1);
    }
}
