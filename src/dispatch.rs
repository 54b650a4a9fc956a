//! Per-chunk external command execution.
//!
//! Each chunk file is rendered through the [`CommandTemplate`] and run as a
//! child process, sequentially by default or on a bounded rayon pool when more
//! workers are requested. Workers block for the full duration of their child
//! process; there is no streaming, timeout, or cancellation.
//!
//! Output attribution uses a [`DirWatcher`] diff of the shared output
//! directory, and under concurrency the diff is additionally filtered to
//! filenames carrying the chunk's [`ChunkIdentity`], rejecting files a sibling
//! chunk's command dropped into the same directory. Templates that cannot
//! carry an identity in any output name fall back to sequential dispatch,
//! where the plain diff attributes files unambiguously.
//!
//! A failing chunk is logged and contributes no files; it never aborts
//! siblings or the run.

use crate::template::{ChunkIdentity, CommandTemplate};
use crate::watcher::DirWatcher;
use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Externally observable outcome of one chunk's command.
#[derive(Debug)]
pub struct Invocation {
    pub chunk_index: usize,
    pub succeeded: bool,
    /// Files that appeared in the output directory and are attributed to this
    /// chunk. Empty for failed invocations.
    pub output_files: Vec<PathBuf>,
}

/// Runs the templated command once per chunk.
pub struct Dispatcher<'a> {
    template: &'a CommandTemplate,
    /// Directory the wrapped tool writes into, shared across workers.
    output_dir: PathBuf,
    /// Working directory for the child processes.
    workdir: PathBuf,
    table_ext: String,
    workers: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        template: &'a CommandTemplate,
        output_dir: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
        table_ext: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            template,
            output_dir: output_dir.into(),
            workdir: workdir.into(),
            table_ext: table_ext.into(),
            workers: workers.max(1),
        }
    }

    /// Execute the command for every chunk, one [`Invocation`] per chunk in
    /// chunk order.
    ///
    /// Identities are assigned only when invocations can actually overlap;
    /// sequential runs keep filenames untouched. A template whose output
    /// names match neither rewriting rule never receives a marker, so
    /// filtering on one would reject every file the chunk produced; such
    /// templates are dispatched sequentially instead.
    pub fn dispatch(&self, chunk_paths: &[PathBuf]) -> Result<Vec<Invocation>> {
        let workers = self.workers.min(chunk_paths.len()).max(1);
        let mut concurrent = workers > 1;
        if concurrent && !self.template.can_disambiguate(&self.table_ext) {
            warn!(
                "command output names cannot carry a chunk marker; \
                 dispatching sequentially instead of on {workers} workers"
            );
            concurrent = false;
        }

        if !concurrent {
            return Ok(chunk_paths
                .iter()
                .enumerate()
                .map(|(i, path)| self.run_chunk(i, path, None))
                .collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("build dispatch worker pool")?;
        info!("dispatching {} chunks on {workers} workers", chunk_paths.len());
        Ok(pool.install(|| {
            chunk_paths
                .par_iter()
                .enumerate()
                .map(|(i, path)| self.run_chunk(i, path, Some(ChunkIdentity(i))))
                .collect()
        }))
    }

    fn run_chunk(
        &self,
        chunk_index: usize,
        input: &Path,
        identity: Option<ChunkIdentity>,
    ) -> Invocation {
        let failed = || Invocation { chunk_index, succeeded: false, output_files: Vec::new() };

        let input = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());
        let argv = self.template.render(&input, identity, &self.table_ext);
        info!("chunk {chunk_index}: executing {}", shell_words::join(argv.iter().map(String::as_str)));

        let watcher = match DirWatcher::acquire(&self.output_dir) {
            Ok(w) => w,
            Err(e) => {
                warn!("chunk {chunk_index}: cannot snapshot output directory: {e:#}");
                return failed();
            }
        };

        let output = match Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&self.workdir)
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!("chunk {chunk_index}: failed to launch {}: {e}", argv[0]);
                return failed();
            }
        };

        if !output.status.success() {
            warn!(
                "chunk {chunk_index}: command exited with {}; stderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return failed();
        }

        let mut files = match watcher.diff() {
            Ok(files) => files,
            Err(e) => {
                warn!("chunk {chunk_index}: cannot diff output directory: {e:#}");
                return failed();
            }
        };
        if let Some(id) = identity {
            files.retain(|p| {
                p.file_name()
                    .map(|n| id.matches(&n.to_string_lossy()))
                    .unwrap_or(false)
            });
        }
        Invocation { chunk_index, succeeded: true, output_files: files }
    }
}
