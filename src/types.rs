//! Record types shared by the classifier, the result store and the snapshot file
//!
//! The string forms of [`OutcomeKind`] are part of the `results.json` format
//! and must not change.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::classifier::Classification;

/// Three-way classification of a single install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum OutcomeKind {
    /// The install command exited successfully
    Passed,
    /// The install failed with a recognised, non-actionable signature
    KnownIssue,
    /// The install failed for a reason nobody has catalogued yet
    Failed,
    /// Never produced by classification. Tolerated when reading results
    /// files written by older tools so `--resume` can re-run those packages.
    Unassigned,
}

impl OutcomeKind {
    /// Returns true for outcomes that came out of a finished classification.
    pub fn is_classified(self) -> bool {
        !matches!(self, Self::Unassigned)
    }
}

/// Outcome of one install attempt, as persisted in `results.json`
///
/// Field order matches the snapshot format: `name`, `cmd`, `stderr`,
/// `stdout`, `result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Package identifier taken from the input list
    pub name: String,
    /// Exact shell command that was executed
    pub cmd: String,
    /// Captured standard error
    pub stderr: String,
    /// Captured standard output
    pub stdout: String,
    /// Classified outcome, set once when the record is built
    pub result: OutcomeKind,
}

impl JobRecord {
    /// Build a record from a finished classification.
    ///
    /// This is the only constructor used by the runner, so every record that
    /// reaches the store carries a classified outcome.
    pub fn from_classification(
        name: impl Into<String>,
        cmd: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        classification: &Classification,
    ) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            stderr: stderr.into(),
            stdout: stdout.into(),
            result: classification.outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_outcome_string_forms() {
        assert_eq!(OutcomeKind::Passed.to_string(), "passed");
        assert_eq!(OutcomeKind::KnownIssue.to_string(), "knownIssue");
        assert_eq!(OutcomeKind::Failed.to_string(), "failed");
        assert_eq!(OutcomeKind::Unassigned.to_string(), "unassigned");
    }

    #[test]
    fn test_outcome_serde_matches_display() {
        for kind in OutcomeKind::iter() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
            let parsed: OutcomeKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_record_field_order() {
        let record = JobRecord {
            name: "a".into(),
            cmd: "npm install a".into(),
            stderr: "e".into(),
            stdout: "o".into(),
            result: OutcomeKind::Failed,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"name":"a","cmd":"npm install a","stderr":"e","stdout":"o","result":"failed"}"#
        );
    }

    #[test]
    fn test_only_unassigned_is_unclassified() {
        assert!(OutcomeKind::Passed.is_classified());
        assert!(OutcomeKind::KnownIssue.is_classified());
        assert!(OutcomeKind::Failed.is_classified());
        assert!(!OutcomeKind::Unassigned.is_classified());
    }
}
