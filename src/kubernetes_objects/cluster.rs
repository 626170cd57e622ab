use std::future::Future;

use futures::io::AsyncWrite;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::{Api, Client};
use thiserror::Error;
use tracing::{Instrument, debug, trace_span};

use super::MANAGER_NAME;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Log stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// The control-plane operations a job run needs.
///
/// Every method maps to exactly one API call, so callers decide about
/// polling, retries and cancellation.
pub trait ClusterClient: Clone + Send + Sync + 'static {
    fn create_job(
        &self,
        namespace: &str,
        job: &Job,
    ) -> impl Future<Output = Result<Job, ClusterError>> + Send;

    fn get_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Job, ClusterError>> + Send;

    fn list_pods(
        &self,
        namespace: &str,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Pod>, ClusterError>> + Send;

    fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Pod, ClusterError>> + Send;

    /// Follows the log of one container and copies it into `writer` until
    /// the stream ends. Returns the number of bytes copied.
    fn copy_logs<W>(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        writer: &mut W,
    ) -> impl Future<Output = Result<u64, ClusterError>> + Send
    where
        W: AsyncWrite + Unpin + Send;

    fn delete_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;

    fn delete_pods(
        &self,
        namespace: &str,
        selector: &str,
    ) -> impl Future<Output = Result<(), ClusterError>> + Send;
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        KubeCluster { client }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterClient for KubeCluster {
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
        let post_params = PostParams {
            field_manager: Some(MANAGER_NAME.to_string()),
            ..Default::default()
        };
        let created = self
            .jobs(namespace)
            .create(&post_params, job)
            .instrument(trace_span!("create_job", kubernetes_namespace = %namespace))
            .await?;
        Ok(created)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Job, ClusterError> {
        Ok(self.jobs(namespace).get(name).await?)
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let params = ListParams::default().labels(selector);
        let pods = self.pods(namespace).list(&params).await?;
        Ok(pods.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        Ok(self.pods(namespace).get(name).await?)
    }

    async fn copy_logs<W>(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        writer: &mut W,
    ) -> Result<u64, ClusterError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let params = LogParams {
            container: Some(container.to_string()),
            follow: true,
            timestamps: false,
            ..Default::default()
        };
        let api = self.pods(namespace);
        let stream = api.log_stream(pod, &params).await?;
        let copied = futures::io::copy_buf(stream, writer).await?;
        debug!("Log stream of pod '{pod}' closed after {copied} bytes.");
        Ok(copied)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.jobs(namespace)
            .delete(name, &DeleteParams::default())
            .instrument(trace_span!(
                "delete_job",
                kubernetes_namespace = %namespace,
                job_name = %name
            ))
            .await?;
        Ok(())
    }

    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<(), ClusterError> {
        let list_params = ListParams::default().labels(selector);
        self.pods(namespace)
            .delete_collection(&DeleteParams::default(), &list_params)
            .instrument(trace_span!(
                "delete_pods",
                kubernetes_namespace = %namespace,
                label_selector = %selector
            ))
            .await?;
        Ok(())
    }
}
