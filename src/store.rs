//! Table persistence behind the [`TableStore`] seam.
//!
//! The pipeline never assumes a concrete on-disk format; everything it needs
//! from a codec is expressed by [`TableStore`]: load a file into a [`Table`],
//! write one back with a free-text description, concatenate along the sample
//! axis, and report the file extension used when rewriting output filenames.
//!
//! One implementation ships: [`JsonTableStore`], a serde_json document holding
//! the ID lists, the nonzero triplets, and both metadata maps.

use crate::table::{AxisMetadata, Entry, Table};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Codec seam between the pipeline and the on-disk table format.
pub trait TableStore: Send + Sync {
    /// File extension (without dot) of this store's table files.
    fn extension(&self) -> &str;

    /// Load a table from disk.
    fn load(&self, path: &Path) -> Result<Table>;

    /// Write a table to disk with a human-readable description.
    fn save(&self, table: &Table, path: &Path, description: &str) -> Result<()>;

    /// Concatenate tables along the sample axis.
    fn concat(&self, base: Table, rest: Vec<Table>) -> Result<Table> {
        base.concat(rest)
    }
}

/// On-disk document for [`JsonTableStore`].
#[derive(Serialize, Deserialize)]
struct TableFile {
    description: String,
    observation_ids: Vec<String>,
    sample_ids: Vec<String>,
    data: Vec<Entry>,
    #[serde(default)]
    sample_metadata: HashMap<String, AxisMetadata>,
    #[serde(default)]
    observation_metadata: HashMap<String, AxisMetadata>,
}

/// JSON codec for sparse tables, extension `table`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTableStore;

impl TableStore for JsonTableStore {
    fn extension(&self) -> &str {
        "table"
    }

    fn load(&self, path: &Path) -> Result<Table> {
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let doc: TableFile = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse table {}", path.display()))?;
        let table = Table::new(doc.observation_ids, doc.sample_ids, doc.data)
            .with_context(|| format!("invalid table {}", path.display()))?;
        Ok(table
            .with_sample_metadata(doc.sample_metadata)
            .with_observation_metadata(doc.observation_metadata))
    }

    fn save(&self, table: &Table, path: &Path, description: &str) -> Result<()> {
        let doc = TableFile {
            description: description.to_string(),
            observation_ids: table.observation_ids().to_vec(),
            sample_ids: table.sample_ids().to_vec(),
            data: table.entries().to_vec(),
            sample_metadata: table.sample_metadata().clone(),
            observation_metadata: table.observation_metadata().clone(),
        };
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer(&mut w, &doc)
            .with_context(|| format!("write table {}", path.display()))?;
        w.flush()?;
        Ok(())
    }
}
