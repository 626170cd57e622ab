use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use super::Job;
use super::cleanup::{CleanupPolicy, should_cleanup};
use super::error::JobError;
use super::log_watcher::{LogWatchReport, LogWatcher};
use crate::kubernetes_objects::cluster::ClusterClient;

impl<C: ClusterClient> Job<C> {
    /// Submits the job, tails its logs and waits for it to finish.
    ///
    /// Returns `Ok` only when the job succeeded.
    #[instrument("run", skip(self), fields(job_name = %self.name()))]
    pub async fn run(&self, ignore_sidecar: bool) -> Result<(), JobError> {
        if ignore_sidecar {
            info!("Ignore sidecar containers");
        }
        let running = self.submit().await?;
        info!("Starting job: {}", running.name);

        // Cancelling the stream token also stops discovery.
        let stop_streams = CancellationToken::new();
        let stop_discovery = stop_streams.child_token();

        let watcher = LogWatcher::new(
            self.client.clone(),
            self.container.clone(),
            self.sink.clone(),
            self.watch.log_poll_interval,
        );
        let mut log_task = tokio::spawn(
            watcher
                .watch(running.clone(), stop_discovery.clone(), stop_streams.clone())
                .in_current_span(),
        );

        let result = self.wait_job(&running, ignore_sidecar).await;

        stop_discovery.cancel();
        if matches!(result, Err(JobError::Interrupted(_))) {
            stop_streams.cancel();
        }
        self.drain_logs(&mut log_task, &stop_streams).await;

        result
    }

    /// Gives open log streams up to the grace period to deliver their last bytes.
    async fn drain_logs(
        &self,
        log_task: &mut JoinHandle<Result<LogWatchReport, JobError>>,
        stop_streams: &CancellationToken,
    ) {
        let joined = match tokio::time::timeout(self.watch.grace_period, &mut *log_task).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!(
                    "Log streams still open after {:?}. Closing them.",
                    self.watch.grace_period
                );
                stop_streams.cancel();
                log_task.await
            }
        };

        match joined {
            Ok(Ok(report)) => debug!(
                "Streamed logs of {} pod(s), {} stream(s) closed early, {} stream(s) failed.",
                report.streamed_pods.len(),
                report.stopped_streams,
                report.failed_streams
            ),
            Ok(Err(e)) => error!("Log watcher stopped: {e}"),
            Err(e) => warn!("Log watcher task did not complete: {e}"),
        }
    }

    /// Validates, runs, and deletes the job when `policy` says so.
    ///
    /// The run's own result is returned unless the cleanup fails.
    #[instrument("run_and_cleanup", skip(self), fields(job_name = %self.name()))]
    pub async fn run_and_cleanup(
        &self,
        policy: CleanupPolicy,
        ignore_sidecar: bool,
    ) -> Result<(), JobError> {
        self.validate()?;
        let result = self.run(ignore_sidecar).await;
        if matches!(result, Err(JobError::Submission(_))) {
            // Nothing was created, so there is nothing to delete.
            return result;
        }
        if !should_cleanup(policy, &result) {
            info!("Job should not be cleaned up (cleanup policy: {policy})");
            return result;
        }
        if let Err(e) = self.cleanup().await {
            if let Err(run_error) = &result {
                error!("Job run failed before cleanup: {run_error}");
            }
            return Err(e);
        }
        result
    }
}
