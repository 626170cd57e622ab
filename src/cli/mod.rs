use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::watch::parse_duration;
use crate::job::CleanupPolicy;

#[derive(Debug, Parser)]
#[clap(name = "kube-job", about = "Run one off job on kubernetes", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub(crate) subcommand: SubCommands,

    /// Kubernetes config file path (falls back to KUBECONFIG, then in-cluster config)
    #[clap(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Enable verbose mode
    #[clap(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum SubCommands {
    /// Run a job on Kubernetes
    Run(RunArgs),

    /// Print the version number
    Version {},
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RunArgs {
    /// Job template file, local path or https URL
    #[clap(short = 'f', long)]
    pub(crate) template_file: String,

    /// Command which overrides the args of the target container
    #[clap(short, long, default_value = "", allow_hyphen_values = true)]
    pub(crate) args: String,

    /// Container name which you want to watch the log
    #[clap(short, long)]
    pub(crate) container: String,

    /// Timeout seconds, 0 waits forever
    #[clap(short, long, default_value_t = 0)]
    pub(crate) timeout: u64,

    /// Which finished jobs to delete: all, succeeded or failed
    #[clap(long, default_value_t = CleanupPolicy::All)]
    pub(crate) cleanup: CleanupPolicy,

    /// Treat the job as finished once the target container completes
    #[clap(long)]
    pub(crate) ignore_sidecar: bool,

    #[clap(long, value_parser = parse_duration, default_value = "3s")]
    pub(crate) poll_interval: Duration,

    #[clap(long, value_parser = parse_duration, default_value = "1s")]
    pub(crate) log_poll_interval: Duration,

    /// How long log streams may keep writing after the job finished
    #[clap(long, value_parser = parse_duration, default_value = "10s")]
    pub(crate) grace_period: Duration,
}
