use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Resumable, shardable batch runs with checkpointed CSV output."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit logs as JSON lines instead of compact text
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, value_name = "DIRECTIVE", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download catalog entries for every chemical system in the compositions table.
    Download(DownloadArgs),
    /// Print the shard that owns each key.
    Assign(AssignArgs),
}

/// Shard selection shared by job commands. Pass both flags or neither.
#[derive(Args, Debug, Clone, Copy)]
pub struct ShardArgs {
    /// Zero-based index of this job
    #[arg(long, value_name = "N")]
    pub job_number: Option<u32>,

    /// Total number of cooperating jobs
    #[arg(long, value_name = "N")]
    pub njobs: Option<u32>,
}

/// Arguments for the `download` subcommand.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub shard: ShardArgs,

    /// JSON run configuration. Defaults apply when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the output directory from the configuration
    #[arg(short, long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Override the compositions table from the configuration
    #[arg(long, value_name = "PATH")]
    pub compositions: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,
}

/// Arguments for the `assign` subcommand.
#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Total number of jobs
    #[arg(long, value_name = "N")]
    pub njobs: u32,

    /// Keys to place
    #[arg(required = true, value_name = "KEY")]
    pub keys: Vec<String>,
}
