//! Loading the input package list.
//!
//! The list is a JSON array of package identifiers. It is read once, before
//! anything is queued, and a failure here is the only fatal error of a run.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Result, SweepError};

const BOM: char = '\u{feff}';

/// Read and parse the package list at `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        SweepError::package_list(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let packages = parse(&content).map_err(|e| {
        SweepError::package_list(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    warn_on_duplicates(&packages);
    Ok(packages)
}

/// Parse a package list, ignoring a leading byte-order mark.
pub fn parse(content: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(content.strip_prefix(BOM).unwrap_or(content))
}

fn warn_on_duplicates(packages: &[String]) {
    let mut seen = HashSet::new();
    for name in packages {
        if !seen.insert(name.as_str()) {
            tracing::warn!("Package {} is listed more than once and will be installed again", name);
        }
    }
}
