pub mod watch;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use self::watch::WatchConfig;
use crate::cli::RunArgs;
use crate::job::CleanupPolicy;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Could not split --args: unbalanced quotes in '{0}'")]
    UnbalancedQuotes(String),
}

/// Everything a `run` invocation needs, validated.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct RunConfig {
    /// Local path or `https://` URL of the Job template
    pub template_file: String,

    /// Replaces the target container's args when not empty
    pub args: Vec<String>,

    pub container: String,

    /// Zero waits forever
    pub timeout: Duration,

    pub cleanup: CleanupPolicy,
    pub ignore_sidecar: bool,
    pub watch: WatchConfig,

    /// Falls back to `KUBECONFIG` and in-cluster discovery when unset
    pub kubeconfig: Option<PathBuf>,
}

impl RunConfig {
    pub(crate) fn from_args(
        args: RunArgs,
        kubeconfig: Option<PathBuf>,
    ) -> Result<RunConfig, ConfigError> {
        Ok(RunConfig {
            args: split_args(&args.args)?,
            template_file: args.template_file,
            container: args.container,
            timeout: Duration::from_secs(args.timeout),
            cleanup: args.cleanup,
            ignore_sidecar: args.ignore_sidecar,
            watch: WatchConfig {
                completion_poll_interval: args.poll_interval,
                log_poll_interval: args.log_poll_interval,
                grace_period: args.grace_period,
            },
            kubeconfig,
        })
    }
}

/// Splits a command line the way a POSIX shell would.
pub fn split_args(command: &str) -> Result<Vec<String>, ConfigError> {
    shlex::split(command).ok_or_else(|| ConfigError::UnbalancedQuotes(command.to_string()))
}
