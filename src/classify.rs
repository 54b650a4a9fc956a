//! Pattern-based grouping of command output files.

use log::debug;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Files grouped by the index of the pattern they matched.
///
/// Categories with no matches are absent from the map.
pub type Classification = BTreeMap<usize, Vec<PathBuf>>;

/// Group files into categories by matching their base names against an
/// ordered pattern list.
///
/// Patterns use search (substring) semantics over the file name, not the full
/// path; anchor the pattern itself for full-name matches. A file may match
/// any number of patterns and is recorded once per matching category.
pub fn classify(files: &[PathBuf], patterns: &[Regex]) -> Classification {
    let mut grouped = Classification::new();
    for (index, pattern) in patterns.iter().enumerate() {
        let matching: Vec<PathBuf> = files
            .iter()
            .filter(|path| {
                file_name(path).map(|name| pattern.is_match(&name)).unwrap_or(false)
            })
            .cloned()
            .collect();
        if !matching.is_empty() {
            debug!("pattern {index} ({pattern}) matched {} files", matching.len());
            grouped.insert(index, matching);
        }
    }
    grouped
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
