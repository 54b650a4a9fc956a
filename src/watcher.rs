//! Scoped directory watcher.
//!
//! The wrapped tool is opaque: the only way to learn which files a command
//! produced is to snapshot the output directory before execution and diff the
//! listing afterwards. That contract is inherently racy when several commands
//! share one directory, so it is isolated here behind an explicit
//! acquire/diff lifecycle and the caller layers identity filtering on top.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// One acquire/diff cycle over a directory listing.
#[derive(Debug)]
pub struct DirWatcher {
    dir: PathBuf,
    before: HashSet<OsString>,
}

impl DirWatcher {
    /// Snapshot the directory's current entries.
    ///
    /// A missing directory snapshots as empty, matching a command that
    /// creates its output directory itself.
    pub fn acquire(dir: &Path) -> Result<Self> {
        Ok(Self { dir: dir.to_path_buf(), before: list(dir)? })
    }

    /// List entries that appeared since [`DirWatcher::acquire`], sorted.
    pub fn diff(self) -> Result<Vec<PathBuf>> {
        let after = list(&self.dir)?;
        let mut new: Vec<PathBuf> = after
            .difference(&self.before)
            .map(|name| self.dir.join(name))
            .collect();
        new.sort();
        Ok(new)
    }
}

fn list(dir: &Path) -> Result<HashSet<OsString>> {
    if !dir.exists() {
        return Ok(HashSet::new());
    }
    let mut names = HashSet::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("list directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        names.insert(entry.file_name());
    }
    Ok(names)
}
