use std::time::Duration;

use thiserror::Error;
use tracing_error::{ExtractSpanTrace, SpanTrace};

use crate::error::SpannedErr;
use crate::kubernetes_objects::cluster::ClusterError;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Container is required")]
    ContainerRequired,

    #[error("Specified container '{0}' does not exist in the template")]
    ContainerNotFound(String),

    #[error("Invalid cleanup policy '{0}': expected one of all, succeeded, failed")]
    InvalidCleanupPolicy(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to create the job: {0}")]
    Submission(SpannedErr<ClusterError>),

    #[error("Failed to watch the job: {0}")]
    WatchTransport(SpannedErr<ClusterError>),

    #[error("Failed to stream logs of pod '{0}': {1}")]
    LogStream(String, SpannedErr<ClusterError>),

    #[error("Job is failed: {0}")]
    WorkloadFailure(String),

    #[error("Job did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Job run was interrupted by {0}")]
    Interrupted(&'static str),

    #[error("Failed to clean up the job: {0}")]
    Cleanup(SpannedErr<ClusterError>),

    #[error("Watcher task did not complete: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ExtractSpanTrace for JobError {
    fn span_trace(&self) -> Option<&SpanTrace> {
        match self {
            JobError::Submission(e) => e.span_trace(),
            JobError::WatchTransport(e) => e.span_trace(),
            JobError::LogStream(_, e) => e.span_trace(),
            JobError::Cleanup(e) => e.span_trace(),
            JobError::Validation(_)
            | JobError::WorkloadFailure(_)
            | JobError::Timeout(_)
            | JobError::Interrupted(_)
            | JobError::TaskJoin(_) => None,
        }
    }
}
