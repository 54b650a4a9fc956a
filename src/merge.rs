//! Reassembly of per-chunk outputs into one table.

use crate::store::TableStore;
use crate::table::Table;
use anyhow::Result;
use log::warn;
use std::path::PathBuf;

/// Load every file and concatenate the results along the sample axis.
///
/// A file that fails to load is skipped with a warning; `Ok(None)` means no
/// file loaded at all. The first successfully loaded table is the base and
/// the rest are concatenated onto it; sample IDs must be disjoint across the
/// inputs (they are by construction, since chunks partition the sample set),
/// and a violation surfaces as the concat error.
pub fn merge(store: &dyn TableStore, files: &[PathBuf]) -> Result<Option<Table>> {
    let mut loaded = Vec::with_capacity(files.len());
    for path in files {
        match store.load(path) {
            Ok(table) => loaded.push(table),
            Err(e) => warn!("could not load {}: {e:#}", path.display()),
        }
    }
    let Some(base) = (!loaded.is_empty()).then(|| loaded.remove(0)) else {
        return Ok(None);
    };
    Ok(Some(store.concat(base, loaded)?))
}
