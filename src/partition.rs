//! Similarity-aware sample partitioning.
//!
//! Samples are ordered by hierarchical similarity over their presence/absence
//! vectors (Ward linkage, dendrogram leaf order) and the ordering is cut into
//! contiguous chunks of bounded size. Placing similar samples adjacently keeps
//! sparse, stratified features confined to few chunks, which shrinks per-chunk
//! command output downstream.
//!
//! Clustering is best-effort: any failure falls back to the natural input
//! order rather than failing the run.

use crate::table::Table;
use anyhow::{Result, bail};
use kodama::{Method, linkage};
use log::{debug, warn};

/// Order samples by hierarchical similarity.
///
/// Returns a permutation of `0..table.num_samples()`. Degenerate inputs
/// (zero or one sample, all samples identical) and clustering failures yield
/// the identity ordering.
pub fn similarity_order(table: &Table) -> Vec<usize> {
    let n = table.num_samples();
    if n <= 1 {
        return (0..n).collect();
    }
    let vectors = table.presence_vectors();
    if vectors.iter().all(|v| *v == vectors[0]) {
        return (0..n).collect();
    }
    match ward_leaf_order(&vectors) {
        Ok(order) => order,
        Err(e) => {
            warn!("sample clustering failed, using natural order: {e}");
            (0..n).collect()
        }
    }
}

/// Ward-linkage clustering over feature vectors, returning dendrogram leaf
/// order.
fn ward_leaf_order(vectors: &[Vec<f64>]) -> Result<Vec<usize>> {
    let n = vectors.len();

    // Condensed pairwise Euclidean distances, pairs (i, j) with i < j.
    let mut condensed = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n - 1 {
        for j in i + 1..n {
            let d: f64 = vectors[i]
                .iter()
                .zip(&vectors[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            let d = d.sqrt();
            if !d.is_finite() {
                bail!("non-finite distance between samples {i} and {j}");
            }
            condensed.push(d);
        }
    }

    let dendrogram = linkage(&mut condensed, n, Method::Ward);

    // Leaves 0..n-1; step i forms cluster n+i. Left-to-right traversal from
    // the root gives the leaf order.
    let steps = dendrogram.steps();
    let mut order = Vec::with_capacity(n);
    let mut stack = vec![n + steps.len() - 1];
    while let Some(cluster) = stack.pop() {
        if cluster < n {
            order.push(cluster);
        } else {
            let step = &steps[cluster - n];
            stack.push(step.cluster2);
            stack.push(step.cluster1);
        }
    }

    // A wrong-sized or non-bijective traversal means a malformed dendrogram.
    let mut seen = vec![false; n];
    for &i in &order {
        if i >= n || seen[i] {
            bail!("dendrogram traversal did not yield a permutation");
        }
        seen[i] = true;
    }
    if order.len() != n {
        bail!("dendrogram traversal yielded {} of {} samples", order.len(), n);
    }
    Ok(order)
}

/// Split a table into similarity-ordered chunks of at most `max_chunk_size`
/// samples.
///
/// The union of chunk sample sets is exactly the input sample set; each chunk
/// is compacted by dropping observations with no nonzero entry in it.
pub fn partition(table: &Table, max_chunk_size: usize) -> Result<Vec<Table>> {
    let max_chunk_size = max_chunk_size.max(1);
    let order = similarity_order(table);
    let mut chunks = Vec::with_capacity(order.len().div_ceil(max_chunk_size));
    for window in order.chunks(max_chunk_size) {
        let chunk = table.select_samples(window)?.remove_empty_observations();
        debug!(
            "chunk {}: {} samples x {} observations",
            chunks.len(),
            chunk.num_samples(),
            chunk.num_observations()
        );
        chunks.push(chunk);
    }
    Ok(chunks)
}
