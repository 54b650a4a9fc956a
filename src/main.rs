use chunkflow::{Orchestrator, RunConfig};
use clap::Parser;
use std::path::PathBuf;

/// Process huge sparse tables with memory-bounded external tools by splitting
/// them into similarity-ordered chunks, running the command per chunk, and
/// joining the per-chunk outputs.
#[derive(Parser)]
#[command(name = "chunkflow")]
#[command(version)]
struct Cli {
    /// Input table file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Command to execute per chunk, as a single string with an {input}
    /// placeholder for the chunk file
    #[arg(value_name = "COMMAND")]
    command: String,

    /// Maximum samples per chunk
    #[arg(long, value_name = "INT", default_value = "100")]
    max_chunk_size: usize,

    /// Concurrent command invocations (1 = sequential, 0 = all cores)
    #[arg(long, value_name = "INT", default_value = "1")]
    num_workers: usize,

    /// Directory for final joined output files
    #[arg(long, value_name = "DIR", default_value = ".")]
    final_output_dir: PathBuf,

    /// Directory where the command creates its output files; relative paths
    /// are resolved inside the run workspace
    #[arg(long, value_name = "DIR", default_value = ".")]
    command_output_dir: PathBuf,

    /// Regex patterns matched against output file names to group them
    /// (e.g. ".*_stratified\.table$" ".*_unstratified\.table$")
    #[arg(long, value_name = "REGEX", num_args = 1.., required = true)]
    output_patterns: Vec<String>,

    /// Names for the output groups; must match the number of patterns
    #[arg(long, value_name = "NAME", num_args = 1..)]
    output_group_names: Option<Vec<String>>,

    /// Prefix for final output files (default: input filename stem)
    #[arg(long, value_name = "PREFIX")]
    output_prefix: Option<String>,

    /// Do not join results; copy matched outputs through renamed
    #[arg(long)]
    no_join: bool,
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = RunConfig::new(cli.input, cli.command, cli.output_patterns);
    config.max_chunk_size = cli.max_chunk_size;
    config.num_workers = cli.num_workers;
    config.final_output_dir = cli.final_output_dir;
    config.command_output_dir = cli.command_output_dir;
    config.output_group_names = cli.output_group_names;
    config.output_prefix = cli.output_prefix;
    config.no_join = cli.no_join;

    match Orchestrator::new(config).run() {
        Ok(summary) => {
            log::info!(
                "done: {} chunks, {} failed, {} output files",
                summary.chunks,
                summary.failed_chunks,
                summary.outputs.len()
            );
        }
        Err(e) => {
            log::error!("{e:#}");
            std::process::exit(1);
        }
    }
}
