//! Property-Based Tests for native-sweep
//!
//! Uses proptest for the classifier and summary invariants:
//! - A successful install is always `Passed`
//! - EBADPLATFORM in stderr is always a known issue
//! - Unmatched failures are always `Failed`
//! - Fatal-error snippets keep their surrounding newlines
//! - Summary counts add up to the number of records

use proptest::prelude::*;

use native_sweep::classifier::{KNOWN_ISSUES, classify};
use native_sweep::store::{Summary, fatal_error_snippet};
use native_sweep::types::{JobRecord, OutcomeKind};

fn contains_signature(text: &str) -> bool {
    KNOWN_ISSUES.iter().any(|issue| text.contains(issue.needle))
}

// =============================================================================
// Classifier Properties
// =============================================================================

proptest! {
    /// No process error means `Passed`, whatever the output says
    #[test]
    fn success_is_always_passed(stdout in ".*", stderr in ".*") {
        prop_assert_eq!(classify(false, &stdout, &stderr).outcome, OutcomeKind::Passed);
    }

    /// EBADPLATFORM in stderr makes a failure a known issue regardless of stdout
    #[test]
    fn ebadplatform_is_known_issue(
        before in "[ -~]{0,40}",
        after in "[ -~]{0,40}",
        stdout in ".*",
    ) {
        let stderr = format!("{}EBADPLATFORM{}", before, after);
        prop_assert_eq!(classify(true, &stdout, &stderr).outcome, OutcomeKind::KnownIssue);
    }

    /// A failure without any signature is `Failed`
    #[test]
    fn unmatched_failure_is_failed(stdout in "[a-z0-9 \n]{0,80}", stderr in "[a-z0-9 \n]{0,80}") {
        prop_assume!(!contains_signature(&stdout) && !contains_signature(&stderr));
        prop_assert_eq!(classify(true, &stdout, &stderr).outcome, OutcomeKind::Failed);
    }
}

// =============================================================================
// Fatal Error Snippet Properties
// =============================================================================

proptest! {
    /// The snippet is the whole line, newline to newline
    #[test]
    fn snippet_keeps_newlines(
        pre in "[a-z ]{0,20}",
        left in "[a-z ]{0,20}",
        right in "[a-z ]{0,20}",
        post in "[a-z\n ]{0,20}",
    ) {
        let stdout = format!("{}\n{}fatal error{}\n{}", pre, left, right, post);
        let expected = format!("\n{}fatal error{}\n", left, right);
        prop_assert_eq!(fatal_error_snippet(&stdout), Some(expected.as_str()));
    }
}

// =============================================================================
// Summary Properties
// =============================================================================

fn outcome_strategy() -> impl Strategy<Value = OutcomeKind> {
    prop_oneof![
        Just(OutcomeKind::Passed),
        Just(OutcomeKind::KnownIssue),
        Just(OutcomeKind::Failed),
    ]
}

proptest! {
    /// Every classified record is counted exactly once
    #[test]
    fn summary_counts_add_up(outcomes in prop::collection::vec(outcome_strategy(), 0..50)) {
        let records: Vec<JobRecord> = outcomes
            .iter()
            .enumerate()
            .map(|(i, result)| JobRecord {
                name: format!("pkg{}", i),
                cmd: format!("npm install pkg{}", i),
                stderr: String::new(),
                stdout: String::new(),
                result: *result,
            })
            .collect();

        let summary = Summary::from_records(&records);
        prop_assert_eq!(summary.total, records.len());
        prop_assert_eq!(summary.passed + summary.known_issue + summary.failed, records.len());
    }

    /// Rendering the same summary twice gives the same text
    #[test]
    fn summary_display_is_stable(count in 0usize..20) {
        let records: Vec<JobRecord> = (0..count)
            .map(|i| JobRecord {
                name: format!("pkg{}", i),
                cmd: format!("npm install pkg{}", i),
                stderr: String::new(),
                stdout: format!("x\nfatal error C{}\n", i % 3),
                result: OutcomeKind::Failed,
            })
            .collect();

        let summary = Summary::from_records(&records);
        prop_assert_eq!(summary.to_string(), Summary::from_records(&records).to_string());
        prop_assert_eq!(summary.fatal_errors.len(), count.min(3));
    }
}
