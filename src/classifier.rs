//! Outcome classification for install attempts
//!
//! A failed install is a known issue when its captured output contains one of
//! the catalogued signatures below; anything else is an actionable failure.
//! Matching is plain substring search, stderr first, then stdout.

use crate::types::OutcomeKind;

/// A catalogued, non-actionable failure signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownIssue {
    /// Short label used in diagnostics
    pub label: &'static str,
    /// Literal text searched for in the captured output
    pub needle: &'static str,
}

/// Every known-issue signature.
pub const KNOWN_ISSUES: &[KnownIssue] = &[
    KnownIssue {
        label: "platform mismatch",
        needle: "EBADPLATFORM",
    },
    KnownIssue {
        label: "missing OpenSSL headers",
        needle: r"cannot open input file 'C:\OpenSSL",
    },
    KnownIssue {
        label: "stale binding conflict",
        needle: "conflicts with Standard Library function declaration",
    },
    KnownIssue {
        label: "missing v8 symbol",
        needle: "is not a member of 'v8",
    },
    KnownIssue {
        label: "missing node symbol",
        needle: "is not a member of 'node",
    },
    KnownIssue {
        label: "command not found",
        needle: "is not recognized as an internal or external command",
    },
];

/// Which captured stream a signature was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stderr,
    Stdout,
}

/// Result of classifying one install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: OutcomeKind,
    /// The signature that made this a known issue, and where it matched
    pub signature: Option<(&'static KnownIssue, Stream)>,
}

impl Classification {
    /// A failure no signature can excuse.
    pub fn failed() -> Self {
        Self {
            outcome: OutcomeKind::Failed,
            signature: None,
        }
    }
}

/// Classify an install attempt from its exit state and captured output.
///
/// Pure and deterministic: no error means `Passed`; otherwise the first
/// signature found in stderr, then stdout, makes it a `KnownIssue`; otherwise
/// it `Failed`.
pub fn classify(error: bool, stdout: &str, stderr: &str) -> Classification {
    if !error {
        return Classification {
            outcome: OutcomeKind::Passed,
            signature: None,
        };
    }

    match find_known_issue(stdout, stderr) {
        Some(hit) => Classification {
            outcome: OutcomeKind::KnownIssue,
            signature: Some(hit),
        },
        None => Classification::failed(),
    }
}

fn find_known_issue(stdout: &str, stderr: &str) -> Option<(&'static KnownIssue, Stream)> {
    [(Stream::Stderr, stderr), (Stream::Stdout, stdout)]
        .into_iter()
        .find_map(|(stream, text)| {
            KNOWN_ISSUES
                .iter()
                .find(|issue| text.contains(issue.needle))
                .map(|issue| (issue, stream))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_error_is_passed() {
        let c = classify(false, "", "");
        assert_eq!(c.outcome, OutcomeKind::Passed);
        assert!(c.signature.is_none());
    }

    #[test]
    fn test_no_error_ignores_signatures() {
        let c = classify(false, "EBADPLATFORM", "EBADPLATFORM");
        assert_eq!(c.outcome, OutcomeKind::Passed);
    }

    #[test]
    fn test_ebadplatform_in_stderr() {
        let c = classify(true, "anything at all", "npm ERR! code EBADPLATFORM");
        assert_eq!(c.outcome, OutcomeKind::KnownIssue);
        let (issue, stream) = c.signature.unwrap();
        assert_eq!(issue.label, "platform mismatch");
        assert_eq!(stream, Stream::Stderr);
    }

    #[test]
    fn test_openssl_needle_keeps_backslash() {
        let stdout = r"LINK : fatal error LNK1181: cannot open input file 'C:\OpenSSL-Win64\lib\libeay32.lib'";
        assert_eq!(classify(true, stdout, "").outcome, OutcomeKind::KnownIssue);
    }

    #[test]
    fn test_each_signature_in_stdout() {
        for issue in KNOWN_ISSUES {
            let stdout = format!("gyp info\n{} here\n", issue.needle);
            let c = classify(true, &stdout, "gyp ERR! build error");
            assert_eq!(c.outcome, OutcomeKind::KnownIssue, "{}", issue.label);
            assert_eq!(c.signature.unwrap().1, Stream::Stdout);
        }
    }

    #[test]
    fn test_stderr_wins_over_stdout() {
        let c = classify(
            true,
            "error C2039: 'Handle': is not a member of 'v8'",
            "'python' is not recognized as an internal or external command",
        );
        let (issue, stream) = c.signature.unwrap();
        assert_eq!(stream, Stream::Stderr);
        assert_eq!(issue.label, "command not found");
    }

    #[test]
    fn test_unmatched_error_is_failed() {
        let c = classify(true, "", "boom");
        assert_eq!(c.outcome, OutcomeKind::Failed);
        assert!(c.signature.is_none());
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(classify(true, "", "ebadplatform").outcome, OutcomeKind::Failed);
    }
}
