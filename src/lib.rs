//! # Chunkflow
//!
//! Run **memory-bounded external analysis tools** over arbitrarily large
//! sparse feature × sample tables, without modifying the tools. The wrapped
//! tools keep a whole table in memory and thrash on very large inputs, but
//! the transformation they perform is per-sample, so chunkflow splits the
//! input into bounded chunks, runs the tool once per chunk, and reassembles
//! the per-chunk outputs into unified result tables.
//!
//! ## Pipeline
//!
//! 1. **Partition** ([`partition`]) - order samples by hierarchical
//!    similarity over their presence/absence vectors (Ward linkage) and cut
//!    the ordering into contiguous chunks of at most `max_chunk_size`
//!    samples. Similar samples land in the same chunk, which keeps sparse
//!    features confined to few chunks and per-chunk outputs small.
//! 2. **Dispatch** ([`dispatch`]) - render the command template once per
//!    chunk and execute it as a child process, sequentially or on a bounded
//!    worker pool. Output files are attributed by diffing the output
//!    directory around each execution; under concurrency every chunk carries
//!    a [`ChunkIdentity`] that is spliced into derived output filenames and
//!    used to filter out sibling chunks' files.
//! 3. **Classify** ([`classify`]) - group each invocation's output files into
//!    named categories with an ordered regex list over base names.
//! 4. **Merge** ([`merge`]) - per category, concatenate every chunk's files
//!    along the sample axis into one final table, or copy them through
//!    unmerged in pass-through mode.
//!
//! The [`run`] module sequences these steps inside a scoped temporary
//! workspace that is removed on every exit path.
//!
//! ## Quick start
//!
//! ```no_run
//! use chunkflow::{Orchestrator, RunConfig};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let mut config = RunConfig::new(
//!     "features.table",
//!     "profile_tool {input} -o profiled.table",
//!     vec![r"_stratified\.table$".into(), r"_unstratified\.table$".into()],
//! );
//! config.max_chunk_size = 50;
//! config.num_workers = 4;
//! config.output_group_names = Some(vec!["stratified".into(), "unstratified".into()]);
//!
//! let summary = Orchestrator::new(config).run()?;
//! println!("{} chunks, outputs: {:?}", summary.chunks, summary.outputs);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure model
//!
//! Configuration and input errors are fatal before any work begins. A chunk
//! whose command exits non-zero contributes no files and never aborts its
//! siblings; a chunk output that fails to parse is skipped during merge with
//! a warning; a category with no matched files produces no output artifact.
//! Per-chunk results are returned to a single collector and folded
//! sequentially; workers never mutate shared state.
//!
//! ## Module overview
//!
//! - [`table`] - in-memory sparse table model
//! - [`store`] - [`TableStore`] codec seam and the shipped JSON codec
//! - [`partition`] - similarity ordering and chunk cutting
//! - [`template`] - command template token grammar and identity splicing
//! - [`watcher`] - scoped output-directory diff
//! - [`dispatch`] - per-chunk command execution and file attribution
//! - [`classify`] - regex categorization of output files
//! - [`merge`] - per-category table reassembly
//! - [`run`] - orchestration, workspace lifecycle, output naming

pub mod classify;
pub mod dispatch;
pub mod merge;
pub mod partition;
pub mod run;
pub mod store;
pub mod table;
pub mod template;
pub mod watcher;

pub use classify::{Classification, classify};
pub use dispatch::{Dispatcher, Invocation};
pub use merge::merge;
pub use partition::{partition, similarity_order};
pub use run::{Orchestrator, RunConfig, RunSummary};
pub use store::{JsonTableStore, TableStore};
pub use table::{AxisMetadata, Entry, Table};
pub use template::{ChunkIdentity, CommandTemplate, INPUT_PLACEHOLDER};
pub use watcher::DirWatcher;
