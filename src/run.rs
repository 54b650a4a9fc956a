//! Run orchestration: partition → dispatch → classify → merge.
//!
//! One [`Orchestrator::run`] call owns a scoped temporary workspace holding
//! the chunk files and, by default, the command output directory. The
//! workspace is a [`tempfile::TempDir`], so it is removed on every exit path
//! (success, partial failure, or error propagation) without explicit
//! cleanup calls.
//!
//! Failure policy: configuration and input errors are fatal and surface
//! before any chunk work begins; a failing chunk command or an unreadable
//! chunk output is logged and skipped; a category with no files simply
//! produces no output artifact.

use crate::classify::{Classification, classify};
use crate::dispatch::Dispatcher;
use crate::merge::merge;
use crate::partition::partition;
use crate::store::{JsonTableStore, TableStore};
use crate::template::CommandTemplate;
use anyhow::{Context, Result, bail};
use log::{error, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Everything one run needs, CLI-shaped.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input table path.
    pub input: PathBuf,
    /// Command template with an `{input}` placeholder.
    pub command: String,
    /// Maximum samples per chunk.
    pub max_chunk_size: usize,
    /// Worker pool size; 1 means strictly sequential, 0 means all cores.
    pub num_workers: usize,
    /// Where final merged or copied outputs land.
    pub final_output_dir: PathBuf,
    /// Where the wrapped command creates its files. Relative paths are
    /// resolved inside the workspace; `.` is the workspace itself.
    pub command_output_dir: PathBuf,
    /// Regex patterns defining the output categories, in order.
    pub output_patterns: Vec<String>,
    /// Human-readable names per category; defaults to `group_0`, `group_1`, ...
    pub output_group_names: Option<Vec<String>>,
    /// Prefix for final output files; defaults to the input filename stem.
    pub output_prefix: Option<String>,
    /// Pass-through mode: copy matched files instead of merging them.
    pub no_join: bool,
}

impl RunConfig {
    pub fn new(
        input: impl Into<PathBuf>,
        command: impl Into<String>,
        output_patterns: Vec<String>,
    ) -> Self {
        Self {
            input: input.into(),
            command: command.into(),
            max_chunk_size: 100,
            num_workers: 1,
            final_output_dir: PathBuf::from("."),
            command_output_dir: PathBuf::from("."),
            output_patterns,
            output_group_names: None,
            output_prefix: None,
            no_join: false,
        }
    }
}

/// Validated, derived form of a [`RunConfig`].
struct Plan {
    template: CommandTemplate,
    patterns: Vec<Regex>,
    group_names: Vec<String>,
    prefix: String,
}

/// What a run produced, for callers that want to inspect it.
#[derive(Debug)]
pub struct RunSummary {
    pub chunks: usize,
    pub failed_chunks: usize,
    pub outputs: Vec<PathBuf>,
}

/// Owns one run end to end.
pub struct Orchestrator {
    config: RunConfig,
    store: Box<dyn TableStore>,
}

impl Orchestrator {
    /// Orchestrator over the default JSON table codec.
    pub fn new(config: RunConfig) -> Self {
        Self::with_store(config, Box::new(JsonTableStore))
    }

    pub fn with_store(config: RunConfig, store: Box<dyn TableStore>) -> Self {
        Self { config, store }
    }

    /// Validate configuration without running anything.
    ///
    /// All configuration errors (empty or invalid patterns, group-name count
    /// mismatch, malformed command template, missing input) are reported here,
    /// before any workspace or output directory is created.
    fn plan(&self) -> Result<Plan> {
        let cfg = &self.config;
        if cfg.output_patterns.is_empty() {
            bail!("at least one output pattern is required");
        }
        let patterns = cfg
            .output_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid output pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;
        let group_names = match &cfg.output_group_names {
            Some(names) => {
                if names.len() != patterns.len() {
                    bail!(
                        "number of group names ({}) must match number of output patterns ({})",
                        names.len(),
                        patterns.len()
                    );
                }
                names.clone()
            }
            None => (0..patterns.len()).map(|i| format!("group_{i}")).collect(),
        };
        let template = CommandTemplate::parse(&cfg.command)?;
        if !cfg.input.is_file() {
            bail!("input table not found: {}", cfg.input.display());
        }
        let prefix = match &cfg.output_prefix {
            Some(p) => p.clone(),
            None => cfg
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string()),
        };
        Ok(Plan { template, patterns, group_names, prefix })
    }

    /// Execute the full pipeline.
    pub fn run(&self) -> Result<RunSummary> {
        let plan = self.plan()?;
        let cfg = &self.config;

        std::fs::create_dir_all(&cfg.final_output_dir)
            .with_context(|| format!("create {}", cfg.final_output_dir.display()))?;

        // Chunks, command outputs, and scratch all live here; removed on drop.
        let workspace = tempfile::Builder::new()
            .prefix("chunkflow-")
            .tempdir()
            .context("create workspace")?;

        info!("loading input table {}", cfg.input.display());
        let table = self
            .store
            .load(&cfg.input)
            .with_context(|| format!("load input table {}", cfg.input.display()))?;
        let (observations, samples) = table.shape();
        info!("input: {samples} samples x {observations} observations");

        info!("partitioning into chunks of at most {} samples", cfg.max_chunk_size);
        let chunks = partition(&table, cfg.max_chunk_size)?;
        let mut chunk_paths = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let name = format!("split_{}.{}", i + 1, self.store.extension());
            let path = workspace.path().join(name);
            info!(
                "saving split {}: {} samples x {} observations",
                i + 1,
                chunk.num_samples(),
                chunk.num_observations()
            );
            self.store
                .save(chunk, &path, &format!("split {}", i + 1))
                .with_context(|| format!("save chunk {}", path.display()))?;
            chunk_paths.push(path);
        }

        let command_output_dir = resolve_output_dir(&cfg.command_output_dir, workspace.path());
        std::fs::create_dir_all(&command_output_dir)
            .with_context(|| format!("create {}", command_output_dir.display()))?;

        let workers = if cfg.num_workers == 0 { num_cpus::get() } else { cfg.num_workers };
        let dispatcher = Dispatcher::new(
            &plan.template,
            &command_output_dir,
            workspace.path(),
            self.store.extension(),
            workers,
        );
        let invocations = dispatcher.dispatch(&chunk_paths)?;
        let failed_chunks = invocations.iter().filter(|i| !i.succeeded).count();
        if failed_chunks > 0 {
            warn!("{failed_chunks} of {} chunk commands failed", invocations.len());
        }

        // Fold per-chunk classifications sequentially; workers never share a
        // mutable mapping.
        let mut aggregated = Classification::new();
        for invocation in &invocations {
            if !invocation.succeeded {
                continue;
            }
            for (category, files) in classify(&invocation.output_files, &plan.patterns) {
                aggregated.entry(category).or_default().extend(files);
            }
        }

        let outputs = if cfg.no_join {
            self.copy_outputs(&plan, &aggregated)?
        } else {
            self.merge_outputs(&plan, &aggregated, samples)?
        };

        Ok(RunSummary { chunks: chunk_paths.len(), failed_chunks, outputs })
    }

    /// Merge mode: one concatenated table per category.
    fn merge_outputs(
        &self,
        plan: &Plan,
        aggregated: &Classification,
        input_samples: usize,
    ) -> Result<Vec<PathBuf>> {
        let cfg = &self.config;
        let mut outputs = Vec::new();
        for (index, group) in plan.group_names.iter().enumerate() {
            let Some(files) = aggregated.get(&index) else {
                info!("no files matched group {index} ({group})");
                continue;
            };
            info!("joining {} files for group {group}", files.len());
            let merged = match merge(self.store.as_ref(), files) {
                Ok(Some(table)) => table,
                Ok(None) => {
                    info!("no loadable table files for group {group}");
                    continue;
                }
                Err(e) => {
                    error!("merging group {group} failed: {e:#}");
                    continue;
                }
            };
            if merged.num_samples() < input_samples {
                warn!(
                    "group {group}: merged table has {} of {input_samples} input samples",
                    merged.num_samples()
                );
            }
            let path = cfg
                .final_output_dir
                .join(format!("{}_{}.{}", plan.prefix, group, self.store.extension()));
            info!("saving joined table {}", path.display());
            self.store
                .save(&merged, &path, &format!("Processed {group} table"))
                .with_context(|| format!("save merged table {}", path.display()))?;
            outputs.push(path);
        }
        Ok(outputs)
    }

    /// Pass-through mode: copy matched files, renamed with prefix and group.
    fn copy_outputs(&self, plan: &Plan, aggregated: &Classification) -> Result<Vec<PathBuf>> {
        let cfg = &self.config;
        let mut outputs = Vec::new();
        for (index, files) in aggregated {
            let group = &plan.group_names[*index];
            for src in files {
                let Some(name) = src.file_name() else {
                    warn!("skipping output without a file name: {}", src.display());
                    continue;
                };
                let dst = cfg
                    .final_output_dir
                    .join(format!("{}_{}_{}", plan.prefix, group, name.to_string_lossy()));
                std::fs::copy(src, &dst).with_context(|| {
                    format!("copy {} to {}", src.display(), dst.display())
                })?;
                info!("copied {} to {}", src.display(), dst.display());
                outputs.push(dst);
            }
        }
        Ok(outputs)
    }
}

/// Resolve the command output directory against the workspace.
fn resolve_output_dir(configured: &Path, workspace: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else if configured == Path::new(".") {
        workspace.to_path_buf()
    } else {
        workspace.join(configured)
    }
}
