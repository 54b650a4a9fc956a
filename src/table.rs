//! In-memory sparse table model.
//!
//! A [`Table`] is a sparse numeric matrix indexed by `(observation, sample)`,
//! with parallel ID lists on both axes and an arbitrary key/value metadata map
//! per ID. Tables are immutable once built; every operation that "changes" a
//! table returns a new one.
//!
//! Invariants enforced at construction:
//! - observation IDs are unique within a table
//! - sample IDs are unique within a table
//! - every stored entry points inside the ID lists
//!
//! Zero-valued entries are dropped at construction, so presence in
//! [`Table::entries`] is equivalent to a nonzero cell.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Arbitrary per-ID metadata attached to one axis entry.
pub type AxisMetadata = BTreeMap<String, serde_json::Value>;

/// One nonzero cell of the sparse matrix, in triplet form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Row index into the observation ID list.
    pub observation: usize,
    /// Column index into the sample ID list.
    pub sample: usize,
    pub value: f64,
}

/// Sparse observation × sample numeric matrix with per-axis metadata.
#[derive(Debug, Clone, Default)]
pub struct Table {
    observation_ids: Vec<String>,
    sample_ids: Vec<String>,
    entries: Vec<Entry>,
    sample_metadata: HashMap<String, AxisMetadata>,
    observation_metadata: HashMap<String, AxisMetadata>,
}

impl Table {
    /// Build a table from ID lists and triplet entries.
    ///
    /// Zero-valued entries are discarded. Duplicate IDs on either axis or an
    /// entry index outside the ID lists are construction errors.
    pub fn new(
        observation_ids: Vec<String>,
        sample_ids: Vec<String>,
        entries: Vec<Entry>,
    ) -> Result<Self> {
        let mut seen = HashSet::with_capacity(observation_ids.len());
        for id in &observation_ids {
            if !seen.insert(id.as_str()) {
                bail!("duplicate observation id: {id}");
            }
        }
        let mut seen = HashSet::with_capacity(sample_ids.len());
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                bail!("duplicate sample id: {id}");
            }
        }
        let mut kept = Vec::with_capacity(entries.len());
        for e in entries {
            if e.observation >= observation_ids.len() || e.sample >= sample_ids.len() {
                bail!(
                    "entry ({}, {}) outside {}x{} table",
                    e.observation,
                    e.sample,
                    observation_ids.len(),
                    sample_ids.len()
                );
            }
            if e.value != 0.0 {
                kept.push(e);
            }
        }
        Ok(Self {
            observation_ids,
            sample_ids,
            entries: kept,
            sample_metadata: HashMap::new(),
            observation_metadata: HashMap::new(),
        })
    }

    /// Attach per-sample metadata, replacing any existing map.
    #[must_use]
    pub fn with_sample_metadata(mut self, metadata: HashMap<String, AxisMetadata>) -> Self {
        self.sample_metadata = metadata;
        self
    }

    /// Attach per-observation metadata, replacing any existing map.
    #[must_use]
    pub fn with_observation_metadata(mut self, metadata: HashMap<String, AxisMetadata>) -> Self {
        self.observation_metadata = metadata;
        self
    }

    /// `(observations, samples)` dimensions.
    pub fn shape(&self) -> (usize, usize) {
        (self.observation_ids.len(), self.sample_ids.len())
    }

    pub fn num_observations(&self) -> usize {
        self.observation_ids.len()
    }

    pub fn num_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn observation_ids(&self) -> &[String] {
        &self.observation_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn sample_metadata(&self) -> &HashMap<String, AxisMetadata> {
        &self.sample_metadata
    }

    pub fn observation_metadata(&self) -> &HashMap<String, AxisMetadata> {
        &self.observation_metadata
    }

    /// Nonzero values of one sample, keyed by observation ID.
    ///
    /// Returns `None` when the sample ID is not in this table. Useful for
    /// order-independent comparison of tables that went through a
    /// split/merge round trip.
    pub fn sample_values(&self, sample_id: &str) -> Option<BTreeMap<String, f64>> {
        let col = self.sample_ids.iter().position(|s| s == sample_id)?;
        let mut out = BTreeMap::new();
        for e in &self.entries {
            if e.sample == col {
                out.insert(self.observation_ids[e.observation].clone(), e.value);
            }
        }
        Some(out)
    }

    /// Dense presence/absence vector per sample (nonzero → 1.0).
    ///
    /// Each vector has `num_observations()` components; this is the feature
    /// space the similarity partitioner clusters in.
    pub fn presence_vectors(&self) -> Vec<Vec<f64>> {
        let mut vectors = vec![vec![0.0; self.observation_ids.len()]; self.sample_ids.len()];
        for e in &self.entries {
            vectors[e.sample][e.observation] = 1.0;
        }
        vectors
    }

    /// Materialize a new table holding the given samples, in the given order.
    ///
    /// All observations are kept; use [`Table::remove_empty_observations`]
    /// afterwards to compact. Metadata for the selected samples is carried
    /// over.
    pub fn select_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let mut sample_ids = Vec::with_capacity(sample_indices.len());
        for &i in sample_indices {
            let Some(id) = self.sample_ids.get(i) else {
                bail!("sample index {i} outside table with {} samples", self.sample_ids.len());
            };
            sample_ids.push(id.clone());
        }
        // old column -> new column
        let mut remap: HashMap<usize, usize> = HashMap::with_capacity(sample_indices.len());
        for (new, &old) in sample_indices.iter().enumerate() {
            remap.insert(old, new);
        }
        let entries = self
            .entries
            .iter()
            .filter_map(|e| {
                remap.get(&e.sample).map(|&new| Entry {
                    observation: e.observation,
                    sample: new,
                    value: e.value,
                })
            })
            .collect();
        let sample_metadata = sample_ids
            .iter()
            .filter_map(|id| self.sample_metadata.get(id).map(|m| (id.clone(), m.clone())))
            .collect();
        Ok(Table::new(self.observation_ids.clone(), sample_ids, entries)?
            .with_sample_metadata(sample_metadata)
            .with_observation_metadata(self.observation_metadata.clone()))
    }

    /// Drop observations with no nonzero entry, preserving order.
    #[must_use]
    pub fn remove_empty_observations(&self) -> Self {
        let mut nonempty = vec![false; self.observation_ids.len()];
        for e in &self.entries {
            nonempty[e.observation] = true;
        }
        let mut remap = vec![usize::MAX; self.observation_ids.len()];
        let mut observation_ids = Vec::new();
        for (old, id) in self.observation_ids.iter().enumerate() {
            if nonempty[old] {
                remap[old] = observation_ids.len();
                observation_ids.push(id.clone());
            }
        }
        let entries = self
            .entries
            .iter()
            .map(|e| Entry {
                observation: remap[e.observation],
                sample: e.sample,
                value: e.value,
            })
            .collect();
        let observation_metadata = observation_ids
            .iter()
            .filter_map(|id| self.observation_metadata.get(id).map(|m| (id.clone(), m.clone())))
            .collect();
        Self {
            observation_ids,
            sample_ids: self.sample_ids.clone(),
            entries,
            sample_metadata: self.sample_metadata.clone(),
            observation_metadata,
        }
    }

    /// Concatenate tables along the sample axis.
    ///
    /// Observations are unioned (base order first, then new observations in
    /// first-seen order); samples are appended in input order. A sample ID
    /// appearing in more than one input is an error: chunk outputs partition
    /// the sample set by construction, so a duplicate means an upstream
    /// contract violation.
    pub fn concat(self, others: Vec<Table>) -> Result<Self> {
        let mut observation_ids = self.observation_ids;
        let mut obs_index: HashMap<String, usize> = observation_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let mut sample_ids = self.sample_ids;
        let mut entries = self.entries;
        let mut sample_metadata = self.sample_metadata;
        let mut observation_metadata = self.observation_metadata;

        for t in others {
            let offset = sample_ids.len();
            sample_ids.extend(t.sample_ids.iter().cloned());
            for e in &t.entries {
                let obs_id = &t.observation_ids[e.observation];
                let row = match obs_index.get(obs_id) {
                    Some(&row) => row,
                    None => {
                        let row = observation_ids.len();
                        observation_ids.push(obs_id.clone());
                        obs_index.insert(obs_id.clone(), row);
                        row
                    }
                };
                entries.push(Entry {
                    observation: row,
                    sample: offset + e.sample,
                    value: e.value,
                });
            }
            sample_metadata.extend(t.sample_metadata);
            observation_metadata.extend(t.observation_metadata);
        }

        Ok(Table::new(observation_ids, sample_ids, entries)?
            .with_sample_metadata(sample_metadata)
            .with_observation_metadata(observation_metadata))
    }
}
