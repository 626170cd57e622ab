use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, trace_span, warn};

use super::RunningJob;
use super::error::JobError;
use super::sink::{LogSink, SinkWriter};
use crate::error::SpannedExt;
use crate::kubernetes_objects::cluster::ClusterClient;
use crate::kubernetes_objects::pod::{PodPhase, diff_pods, includes_container, pod_name};

type StreamResult = (String, Result<StreamEnd, JobError>);

/// How a single pod's stream ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    /// The container's log reached EOF after this many bytes.
    Finished(u64),
    /// Closed by the stop token before EOF.
    Stopped,
}

/// Tails the target container of every pod of a job, including pods that
/// show up after the watcher started.
pub(crate) struct LogWatcher<C> {
    client: C,
    container: String,
    sink: Arc<dyn LogSink>,
    poll_interval: Duration,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct LogWatchReport {
    pub(crate) streamed_pods: Vec<String>,
    pub(crate) stopped_streams: usize,
    pub(crate) failed_streams: usize,
}

impl LogWatchReport {
    fn record(&mut self, joined: Result<StreamResult, JoinError>) {
        match joined {
            Ok((pod, Ok(StreamEnd::Finished(bytes)))) => {
                debug!("Finished streaming logs of pod '{pod}' ({bytes} bytes).");
                self.streamed_pods.push(pod);
            }
            Ok((pod, Ok(StreamEnd::Stopped))) => {
                debug!("Closed log stream of pod '{pod}' before it ended.");
                self.stopped_streams += 1;
            }
            Ok((pod, Err(e))) => {
                warn!("Stopped streaming logs of pod '{pod}': {e}");
                self.failed_streams += 1;
            }
            Err(e) => {
                warn!("Log stream task did not complete: {e}");
                self.failed_streams += 1;
            }
        }
    }
}

impl<C: ClusterClient> LogWatcher<C> {
    pub(crate) fn new(
        client: C,
        container: String,
        sink: Arc<dyn LogSink>,
        poll_interval: Duration,
    ) -> Self {
        LogWatcher {
            client,
            container,
            sink,
            poll_interval,
        }
    }

    /// Discovers pods on every tick until `stop_discovery` fires, then waits for
    /// the running streams. Streams end on their own when the container exits,
    /// or when `stop_streams` fires.
    ///
    /// Never returns on its own while the job keeps producing pods. A failing
    /// stream is recorded and does not affect the other streams.
    #[instrument("log_watcher", skip_all, fields(job_name = %running.name))]
    pub(crate) async fn watch(
        self,
        running: RunningJob,
        stop_discovery: CancellationToken,
        stop_streams: CancellationToken,
    ) -> Result<LogWatchReport, JobError> {
        let mut seen: Vec<Pod> = Vec::new();
        let mut streams: JoinSet<StreamResult> = JoinSet::new();
        let mut report = LogWatchReport::default();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let discovered = loop {
            tokio::select! {
                biased;

                _ = stop_discovery.cancelled() => break Ok(()),
                Some(joined) = streams.join_next(), if !streams.is_empty() => report.record(joined),
                _ = ticker.tick() => {
                    let current = match self
                        .client
                        .list_pods(&running.namespace, &running.pod_selector)
                        .await
                    {
                        Ok(pods) => pods,
                        Err(e) => break Err(e).with_span_trace().map_err(JobError::WatchTransport),
                    };
                    for pod in diff_pods(&seen, &current) {
                        self.spawn_stream(&mut streams, pod, stop_streams.child_token());
                    }
                    seen = current;
                }
            }
        };

        if let Err(e) = &discovered {
            warn!("Pod discovery stopped: {e}");
        }
        while let Some(joined) = streams.join_next().await {
            report.record(joined);
        }
        discovered.map(|()| report)
    }

    fn spawn_stream(&self, streams: &mut JoinSet<StreamResult>, pod: Pod, stop: CancellationToken) {
        let name = pod_name(&pod).to_string();
        if !includes_container(&pod, &self.container) {
            debug!(
                "Pod '{}' has no container '{}'. Not streaming its logs.",
                name, self.container
            );
            return;
        }
        info!("Found new pod '{name}'.");

        let client = self.client.clone();
        let container = self.container.clone();
        let sink = self.sink.clone();
        let poll_interval = self.poll_interval;
        let span = trace_span!("stream_pod_logs", pod_name = %name);
        streams.spawn(
            async move {
                let result =
                    stream_pod_logs(client, pod, &container, sink, poll_interval, stop).await;
                (name, result)
            }
            .instrument(span),
        );
    }
}

async fn stream_pod_logs<C: ClusterClient>(
    client: C,
    pod: Pod,
    container: &str,
    sink: Arc<dyn LogSink>,
    poll_interval: Duration,
    stop: CancellationToken,
) -> Result<StreamEnd, JobError> {
    let name = pod_name(&pod).to_string();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();

    let mut current = pod;
    while PodPhase::of(&current) == PodPhase::Pending {
        tokio::select! {
            _ = stop.cancelled() => return Ok(StreamEnd::Stopped),
            _ = tokio::time::sleep(poll_interval) => {}
        }
        current = client
            .get_pod(&namespace, &name)
            .await
            .with_span_trace()
            .map_err(|e| JobError::LogStream(name.clone(), e))?;
    }

    let mut writer = SinkWriter::new(sink);
    tokio::select! {
        _ = stop.cancelled() => Ok(StreamEnd::Stopped),
        copied = client.copy_logs(&namespace, &name, container, &mut writer) => {
            copied
                .map(StreamEnd::Finished)
                .with_span_trace()
                .map_err(|e| JobError::LogStream(name.clone(), e))
        }
    }
}
