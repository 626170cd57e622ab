//! In-memory cluster used by the job tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::io::{AsyncWrite, Cursor};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::Pod;

use super::cluster::{ClusterClient, ClusterError};
use super::pod::{includes_container, pod_name};

#[derive(Default)]
pub(crate) struct FakeState {
    /// Served in order by `get_job`; the last one repeats
    pub(crate) job_statuses: VecDeque<JobStatus>,
    pub(crate) pods: Vec<Pod>,
    pub(crate) logs: HashMap<String, Vec<u8>>,
    pub(crate) failing_log_pods: HashSet<String>,
    /// Pods whose log stream never ends after the scripted bytes
    pub(crate) endless_log_pods: HashSet<String>,

    pub(crate) fail_create: bool,
    pub(crate) fail_get_job: bool,
    pub(crate) fail_list_pods: bool,
    pub(crate) fail_delete_job: bool,
    pub(crate) fail_delete_pods: bool,

    created: Vec<Job>,
    deleted_jobs: Vec<(String, String)>,
    deleted_pod_selectors: Vec<String>,
    calls: usize,
    job_polls: usize,
    pod_lists: usize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

fn injected(what: &str) -> ClusterError {
    ClusterError::Io(io::Error::other(format!("injected {what} failure")))
}

impl FakeCluster {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.lock());
    }

    pub(crate) fn calls(&self) -> usize {
        self.lock().calls
    }

    pub(crate) fn job_polls(&self) -> usize {
        self.lock().job_polls
    }

    pub(crate) fn pod_lists(&self) -> usize {
        self.lock().pod_lists
    }

    pub(crate) fn created_jobs(&self) -> Vec<Job> {
        self.lock().created.clone()
    }

    pub(crate) fn deleted_jobs(&self) -> Vec<(String, String)> {
        self.lock().deleted_jobs.clone()
    }

    pub(crate) fn deleted_pod_selectors(&self) -> Vec<String> {
        self.lock().deleted_pod_selectors.clone()
    }
}

impl ClusterClient for FakeCluster {
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.fail_create {
            return Err(injected("create"));
        }
        let mut created = job.clone();
        created.metadata.namespace = Some(namespace.to_string());
        state.created.push(created.clone());
        Ok(created)
    }

    async fn get_job(&self, _namespace: &str, name: &str) -> Result<Job, ClusterError> {
        let mut state = self.lock();
        state.calls += 1;
        state.job_polls += 1;
        if state.fail_get_job {
            return Err(injected("get job"));
        }
        let status = if state.job_statuses.len() > 1 {
            state.job_statuses.pop_front()
        } else {
            state.job_statuses.front().cloned()
        };
        let mut job = state
            .created
            .iter()
            .find(|j| j.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| ClusterError::Io(io::Error::new(io::ErrorKind::NotFound, name)))?;
        job.status = status;
        Ok(job)
    }

    async fn list_pods(&self, _namespace: &str, _selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let mut state = self.lock();
        state.calls += 1;
        state.pod_lists += 1;
        if state.fail_list_pods {
            return Err(injected("list pods"));
        }
        Ok(state.pods.clone())
    }

    async fn get_pod(&self, _namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        let mut state = self.lock();
        state.calls += 1;
        state
            .pods
            .iter()
            .find(|p| pod_name(p) == name)
            .cloned()
            .ok_or_else(|| ClusterError::Io(io::Error::new(io::ErrorKind::NotFound, name)))
    }

    async fn copy_logs<W>(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        writer: &mut W,
    ) -> Result<u64, ClusterError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (bytes, endless) = {
            let mut state = self.lock();
            state.calls += 1;
            let has_container = state
                .pods
                .iter()
                .any(|p| pod_name(p) == pod && includes_container(p, container));
            if !has_container || state.failing_log_pods.contains(pod) {
                return Err(ClusterError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("container {container} is not valid for pod {pod}"),
                )));
            }
            (
                state.logs.get(pod).cloned().unwrap_or_default(),
                state.endless_log_pods.contains(pod),
            )
        };

        let copied = futures::io::copy_buf(Cursor::new(bytes), writer).await?;
        if endless {
            future::pending::<()>().await;
        }
        Ok(copied)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.fail_delete_job {
            return Err(injected("delete job"));
        }
        state
            .deleted_jobs
            .push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn delete_pods(&self, _namespace: &str, selector: &str) -> Result<(), ClusterError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.fail_delete_pods {
            return Err(injected("delete pods"));
        }
        state.deleted_pod_selectors.push(selector.to_string());
        Ok(())
    }
}
