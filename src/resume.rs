//! Continuing an interrupted sweep from its results file.

use std::collections::HashMap;
use std::path::Path;

use crate::environment::RunConfig;
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::store::ResultStore;

/// Seed `store` from the results file at `path` and return the packages
/// that still need an install attempt, in their original order.
///
/// A missing file means a fresh start. Records without a classified outcome
/// are dropped so those packages run again. A package listed more than once
/// is skipped only as many times as it was recorded.
pub fn resume_from(
    path: &Path,
    store: &ResultStore,
    packages: Vec<String>,
    current: &RunConfig,
) -> Result<Vec<String>> {
    if !path.exists() {
        tracing::info!("No results at {}, starting fresh", path.display());
        return Ok(packages);
    }

    let snapshot = Snapshot::load(path)?;
    if snapshot.config != *current {
        tracing::warn!(
            "Resuming results recorded on a different environment ({}); now {}",
            snapshot.config,
            current
        );
    }

    let previous = snapshot.results.len();
    let kept: Vec<_> = snapshot
        .results
        .into_iter()
        .filter(|r| r.result.is_classified())
        .collect();
    if kept.len() < previous {
        tracing::info!(
            "{} unfinished record(s) will be installed again",
            previous - kept.len()
        );
    }

    let mut done: HashMap<String, usize> = HashMap::new();
    for record in &kept {
        *done.entry(record.name.clone()).or_default() += 1;
    }
    store.seed(kept);

    let remaining: Vec<String> = packages
        .into_iter()
        .filter(|name| match done.get_mut(name) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        })
        .collect();
    tracing::info!(
        "Resumed {} result(s), {} package(s) left",
        store.len(),
        remaining.len()
    );
    Ok(remaining)
}
