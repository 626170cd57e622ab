//! Running a single batch/v1 Job to completion.
//!
//! A [`Job`] owns the resolved template and submits a copy of it. While the
//! workload runs, the completion watcher polls its status and the log watcher
//! tails the target container of every pod it belongs to. Afterwards the
//! configured [`CleanupPolicy`] decides whether the job and its pods are
//! deleted.

pub mod cleanup;
mod completion;
pub mod error;
mod log_watcher;
mod runner;
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use derive_debug::Dbg;
use k8s_openapi::api::batch::v1::Job as BatchJob;
use tracing::{info, instrument};

use crate::config::watch::WatchConfig;
use crate::error::SpannedExt;
use crate::kubernetes_objects::DEFAULT_NAMESPACE;
use crate::kubernetes_objects::cluster::ClusterClient;
use crate::kubernetes_objects::pod::{job_name_selector, label_selector};
use crate::kubernetes_objects::template::generate_random_name;
use crate::shutdown::Shutdown;

pub use self::cleanup::{CleanupPolicy, should_cleanup};
pub use self::error::{JobError, ValidationError};
pub use self::sink::{LogSink, StdoutSink};

#[derive(Dbg)]
pub struct Job<C> {
    #[dbg(skip)]
    client: C,

    /// Template with the randomized name applied
    #[dbg(skip)]
    current_job: BatchJob,

    /// Overrides the target container's args when not empty
    args: Vec<String>,

    /// Target container name
    container: String,

    /// `None` waits forever
    timeout: Option<Duration>,

    watch: WatchConfig,
    #[dbg(skip)]
    sink: Arc<dyn LogSink>,
    shutdown: Option<Shutdown>,
}

/// The server-acknowledged job every watcher keys on.
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub namespace: String,
    pub name: String,

    /// Selects the pods created from the job's pod template
    pub pod_selector: String,
}

impl RunningJob {
    fn from_created(created: BatchJob, fallback_namespace: &str) -> RunningJob {
        let namespace = created
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| fallback_namespace.to_string());
        let name = created.metadata.name.clone().unwrap_or_default();
        let pod_selector = created
            .spec
            .as_ref()
            .and_then(|s| s.template.metadata.as_ref())
            .and_then(|m| m.labels.as_ref())
            .filter(|labels| !labels.is_empty())
            .map(label_selector)
            .unwrap_or_else(|| job_name_selector(&name));
        RunningJob {
            namespace,
            name,
            pod_selector,
        }
    }
}

impl<C: ClusterClient> Job<C> {
    /// Wraps a loaded template. The job name gets a random suffix so the same
    /// template can be run repeatedly.
    pub fn new(
        client: C,
        mut template: BatchJob,
        args: Vec<String>,
        container: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ValidationError> {
        let container = container.into();
        if container.is_empty() {
            return Err(ValidationError::ContainerRequired);
        }
        let base_name = template.metadata.name.clone().unwrap_or_default();
        template.metadata.name = Some(generate_random_name(&base_name));

        Ok(Job {
            client,
            current_job: template,
            args,
            container,
            timeout: (!timeout.is_zero()).then_some(timeout),
            watch: WatchConfig::default(),
            sink: Arc::new(StdoutSink),
            shutdown: None,
        })
    }

    pub fn with_watch_config(mut self, watch: WatchConfig) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Lets SIGINT/SIGTERM end the wait early.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn name(&self) -> &str {
        self.current_job.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.current_job
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Checks the template before anything is sent to the cluster.
    pub fn validate(&self) -> Result<(), ValidationError> {
        find_container_index(&self.current_job, &self.container).map(|_| ())
    }

    /// Creates the job on the cluster with the args override applied.
    #[instrument("submit", skip(self), fields(job_name = %self.name()))]
    pub async fn submit(&self) -> Result<RunningJob, JobError> {
        let mut manifest = self.current_job.clone();
        let index = find_container_index(&manifest, &self.container)?;
        if !self.args.is_empty() {
            info!("Received args: {:?}", self.args);
            if let Some(pod_spec) = manifest
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut())
            {
                pod_spec.containers[index].args = Some(self.args.clone());
            }
        }

        let created = self
            .client
            .create_job(self.namespace(), &manifest)
            .await
            .with_span_trace()
            .map_err(JobError::Submission)?;
        Ok(RunningJob::from_created(created, self.namespace()))
    }
}

fn find_container_index(job: &BatchJob, container: &str) -> Result<usize, ValidationError> {
    job.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|pod_spec| pod_spec.containers.iter().position(|c| c.name == container))
        .ok_or_else(|| ValidationError::ContainerNotFound(container.to_string()))
}
