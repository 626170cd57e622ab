use std::future;
use std::time::Duration;

use k8s_openapi::api::batch::v1::{Job as BatchJob, JobCondition};
use k8s_openapi::api::core::v1::Pod;
use tracing::{Instrument, debug, info, instrument, warn};

use super::error::JobError;
use super::{Job, RunningJob};
use crate::error::SpannedExt;
use crate::kubernetes_objects::cluster::ClusterClient;
use crate::kubernetes_objects::pod::{ContainerCompletion, container_completion, includes_container};
use crate::shutdown::Shutdown;

const JOB_FAILED_CONDITION: &str = "Failed";

/// What one poll learned about the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobState {
    Active,
    Succeeded,
    Failed(String),
}

impl JobState {
    fn into_result(self) -> Option<Result<(), JobError>> {
        match self {
            JobState::Active => None,
            JobState::Succeeded => Some(Ok(())),
            JobState::Failed(reason) => Some(Err(JobError::WorkloadFailure(reason))),
        }
    }
}

/// A job with no active pods has left the active state; its conditions tell how.
pub(crate) fn observe_job(job: &BatchJob) -> JobState {
    let status = job.status.clone().unwrap_or_default();
    if status.active.unwrap_or(0) > 0 {
        return JobState::Active;
    }
    match check_job_conditions(status.conditions.as_deref().unwrap_or_default()) {
        Ok(()) => JobState::Succeeded,
        Err(reason) => JobState::Failed(reason),
    }
}

pub(crate) fn check_job_conditions(conditions: &[JobCondition]) -> Result<(), String> {
    match conditions.iter().find(|c| c.type_ == JOB_FAILED_CONDITION) {
        Some(condition) => Err(condition
            .reason
            .clone()
            .unwrap_or_else(|| "no reason reported".to_string())),
        None => Ok(()),
    }
}

/// Decides whether the target container is done in every pod that runs it,
/// regardless of any other container still running next to it.
pub(crate) fn target_container_state(pods: &[Pod], container: &str) -> JobState {
    let mut failure = None;
    let mut found = false;
    for pod in pods.iter().filter(|pod| includes_container(pod, container)) {
        found = true;
        match container_completion(pod, container) {
            ContainerCompletion::NotCompleted => return JobState::Active,
            ContainerCompletion::Succeeded => {}
            ContainerCompletion::Failed(reason) => failure = Some(reason),
        }
    }
    match (found, failure) {
        (false, _) => JobState::Active,
        (true, Some(reason)) => JobState::Failed(reason),
        (true, None) => JobState::Succeeded,
    }
}

#[instrument(
    "wait_job_complete",
    skip(client, running),
    fields(job_name = %running.name),
    level = "debug"
)]
pub(crate) async fn wait_job_complete<C: ClusterClient>(
    client: C,
    running: RunningJob,
    container: String,
    ignore_sidecar: bool,
    poll_interval: Duration,
) -> Result<(), JobError> {
    let mut polls = 0u64;
    loop {
        tokio::time::sleep(poll_interval).await;
        polls += 1;

        let job = client
            .get_job(&running.namespace, &running.name)
            .await
            .with_span_trace()
            .map_err(JobError::WatchTransport)?;

        let mut state = observe_job(&job);
        if state == JobState::Active && ignore_sidecar {
            let pods = client
                .list_pods(&running.namespace, &running.pod_selector)
                .await
                .with_span_trace()
                .map_err(JobError::WatchTransport)?;
            state = target_container_state(&pods, &container);
            if state != JobState::Active {
                warn!(
                    "Pod is still running, but container '{}' is completed, so the job is treated as finished.",
                    container
                );
            }
        }

        match state.into_result() {
            Some(result) => {
                debug!("Job '{}' left the active state after {} polls.", running.name, polls);
                return result;
            }
            None => debug!(
                "Job '{}' still active. Polling again in {} ms...",
                running.name,
                poll_interval.as_millis()
            ),
        }
    }
}

impl<C: ClusterClient> Job<C> {
    /// Blocks until the job finishes, the timeout elapses or a shutdown signal arrives.
    ///
    /// Polling runs on its own task, and only that task delivers a job outcome.
    pub(crate) async fn wait_job(
        &self,
        running: &RunningJob,
        ignore_sidecar: bool,
    ) -> Result<(), JobError> {
        info!("Waiting for running job...");
        let mut handle = tokio::spawn(
            wait_job_complete(
                self.client.clone(),
                running.clone(),
                self.container.clone(),
                ignore_sidecar,
                self.watch.completion_poll_interval,
            )
            .in_current_span(),
        );

        let result = tokio::select! {
            joined = &mut handle => joined?,
            timeout = deadline(self.timeout) => {
                handle.abort();
                Err(JobError::Timeout(timeout))
            }
            signal = interrupted(self.shutdown.as_ref()) => {
                handle.abort();
                Err(JobError::Interrupted(signal))
            }
        };

        if result.is_ok() {
            info!("Job '{}' is succeeded", running.name);
        }
        result
    }
}

async fn deadline(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) => {
            tokio::time::sleep(timeout).await;
            timeout
        }
        None => future::pending().await,
    }
}

async fn interrupted(shutdown: Option<&Shutdown>) -> &'static str {
    match shutdown {
        Some(shutdown) => shutdown.wait().await,
        None => future::pending().await,
    }
}
