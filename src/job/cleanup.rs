use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::Job;
use super::error::{JobError, ValidationError};
use crate::error::SpannedExt;
use crate::kubernetes_objects::cluster::ClusterClient;
use crate::kubernetes_objects::pod::job_name_selector;

/// When to delete the job and its pods after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleanupPolicy {
    /// Whether the job succeeded or failed
    #[default]
    #[serde(rename = "all")]
    All,

    #[serde(rename = "succeeded")]
    SucceededOnly,

    #[serde(rename = "failed")]
    FailedOnly,
}

impl CleanupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPolicy::All => "all",
            CleanupPolicy::SucceededOnly => "succeeded",
            CleanupPolicy::FailedOnly => "failed",
        }
    }
}

impl Display for CleanupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(CleanupPolicy::All),
            "succeeded" => Ok(CleanupPolicy::SucceededOnly),
            "failed" => Ok(CleanupPolicy::FailedOnly),
            other => Err(ValidationError::InvalidCleanupPolicy(other.to_string())),
        }
    }
}

pub fn should_cleanup<E>(policy: CleanupPolicy, run_result: &Result<(), E>) -> bool {
    match policy {
        CleanupPolicy::All => true,
        CleanupPolicy::SucceededOnly => run_result.is_ok(),
        CleanupPolicy::FailedOnly => run_result.is_err(),
    }
}

impl<C: ClusterClient> Job<C> {
    /// Deletes the job, then every pod labelled with its name.
    #[instrument("cleanup", skip(self), fields(job_name = %self.name()))]
    pub async fn cleanup(&self) -> Result<(), JobError> {
        info!("Removing the job: {}", self.name());
        self.client
            .delete_job(self.namespace(), self.name())
            .await
            .with_span_trace()
            .map_err(JobError::Cleanup)?;
        self.remove_pods().await
    }

    async fn remove_pods(&self) -> Result<(), JobError> {
        let selector = job_name_selector(self.name());
        info!("Removing related pods with labels: {selector}");
        self.client
            .delete_pods(self.namespace(), &selector)
            .await
            .with_span_trace()
            .map_err(JobError::Cleanup)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::job::fixtures::job;
    use crate::kubernetes_objects::fake::FakeCluster;

    fn failed() -> Result<(), JobError> {
        Err(JobError::WorkloadFailure("test".to_string()))
    }

    #[test]
    fn test_should_cleanup_all() {
        assert!(should_cleanup(CleanupPolicy::All, &Ok::<(), JobError>(())));
        assert!(should_cleanup(CleanupPolicy::All, &failed()));
    }

    #[test]
    fn test_should_cleanup_succeeded_only() {
        assert!(should_cleanup(CleanupPolicy::SucceededOnly, &Ok::<(), JobError>(())));
        assert!(!should_cleanup(CleanupPolicy::SucceededOnly, &failed()));
        assert!(!should_cleanup(
            CleanupPolicy::SucceededOnly,
            &Err::<(), _>(JobError::Timeout(Duration::from_secs(1)))
        ));
    }

    #[test]
    fn test_should_cleanup_failed_only() {
        assert!(!should_cleanup(CleanupPolicy::FailedOnly, &Ok::<(), JobError>(())));
        assert!(should_cleanup(CleanupPolicy::FailedOnly, &failed()));
    }

    #[test]
    fn test_cleanup_policy_parse_and_display() {
        for policy in [
            CleanupPolicy::All,
            CleanupPolicy::SucceededOnly,
            CleanupPolicy::FailedOnly,
        ] {
            assert_eq!(policy.to_string().parse::<CleanupPolicy>(), Ok(policy));
        }
        assert_eq!(
            "sometimes".parse::<CleanupPolicy>(),
            Err(ValidationError::InvalidCleanupPolicy("sometimes".to_string()))
        );
    }

    #[test]
    fn test_cleanup_policy_deserialize() {
        let policy: CleanupPolicy = serde_yaml::from_str("succeeded").unwrap();
        assert_eq!(policy, CleanupPolicy::SucceededOnly);
        assert!(serde_yaml::from_str::<CleanupPolicy>("never").is_err());
    }

    #[tokio::test]
    async fn test_cleanup_deletes_job_and_pods() {
        let cluster = FakeCluster::default();
        let (job, _) = job(&cluster, "alpine", Duration::ZERO);
        job.cleanup().await.unwrap();

        assert_eq!(
            cluster.deleted_jobs(),
            vec![("default".to_string(), job.name().to_string())]
        );
        assert_eq!(
            cluster.deleted_pod_selectors(),
            vec![format!("job-name={}", job.name())]
        );
    }

    #[tokio::test]
    async fn test_cleanup_stops_when_job_deletion_fails() {
        let cluster = FakeCluster::default();
        cluster.update(|s| s.fail_delete_job = true);
        let (job, _) = job(&cluster, "alpine", Duration::ZERO);

        assert!(matches!(job.cleanup().await, Err(JobError::Cleanup(_))));
        assert!(cluster.deleted_pod_selectors().is_empty());
    }
}
