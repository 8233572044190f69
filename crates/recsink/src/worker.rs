//! Download worker loop: fetch, store locally, delete remotely, retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::RecordingClient;
use crate::downloader::{AbandonReason, DownloaderEvent};
use crate::job::{RecordingJob, RetryDecision, RetryableJob};
use crate::queue::JobQueue;
use crate::storage::{RecordingStorage, StorageError};

/// What processing one item produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    /// Stored locally and removed remotely (or already gone remotely).
    Completed,
    /// The remote server does not know the recording; terminal.
    NotFound,
    /// A transient client or storage failure, subject to the retry policy.
    Retry,
}

/// One download worker. N of these run concurrently, each strictly
/// sequential inside, which is what bounds the number of simultaneous
/// downloads to N.
pub(crate) struct DownloadWorker {
    pub(crate) id: usize,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) client: Arc<dyn RecordingClient>,
    pub(crate) storage: Arc<dyn RecordingStorage>,
    pub(crate) retry_window: Duration,
    pub(crate) shutdown: CancellationToken,
    pub(crate) events: broadcast::Sender<DownloaderEvent>,
}

impl DownloadWorker {
    pub(crate) async fn run(self) {
        debug!(worker = self.id, "Download worker started");

        loop {
            let Some(item) = self.queue.pop().await else {
                debug!(worker = self.id, "Queue drained and closed");
                break;
            };

            self.process(item).await;

            // The stop signal is only observed between items; an in-flight
            // download always runs to completion first.
            if self.shutdown.is_cancelled() {
                debug!(worker = self.id, "Stop signal observed");
                break;
            }
        }

        debug!(worker = self.id, "Download worker exited");
    }

    async fn process(&self, mut item: RetryableJob) {
        match self.execute(item.job()).await {
            ItemOutcome::Completed => {
                info!(worker = self.id, name = %item.job().name, "Recording offloaded");
                let _ = self.events.send(DownloaderEvent::JobCompleted {
                    job: item.into_job(),
                });
            }
            ItemOutcome::NotFound => {
                let _ = self.events.send(DownloaderEvent::JobAbandoned {
                    job: item.into_job(),
                    reason: AbandonReason::NotFound,
                });
            }
            ItemOutcome::Retry => match item.mark_failed(Instant::now(), self.retry_window) {
                RetryDecision::Retry { first_failure } => {
                    if first_failure {
                        info!(
                            worker = self.id,
                            name = %item.job().name,
                            window = ?self.retry_window,
                            "First failure; job will be retried until the window closes"
                        );
                    }
                    let job = item.job().clone();
                    match self.queue.push(item) {
                        Ok(()) => {
                            debug!(worker = self.id, name = %job.name, "Job requeued for retry");
                            let _ = self.events.send(DownloaderEvent::JobRequeued { job });
                        }
                        Err(rejected) => {
                            warn!(
                                worker = self.id,
                                name = %job.name,
                                "Queue closed during retry; dropping job"
                            );
                            let _ = self.events.send(DownloaderEvent::JobAbandoned {
                                job: rejected.into_job(),
                                reason: AbandonReason::QueueClosed,
                            });
                        }
                    }
                }
                RetryDecision::Abandon => {
                    warn!(
                        worker = self.id,
                        name = %item.job().name,
                        "Retry window expired; abandoning job"
                    );
                    let _ = self.events.send(DownloaderEvent::JobAbandoned {
                        job: item.into_job(),
                        reason: AbandonReason::RetryWindowExpired,
                    });
                }
            },
        }
    }

    /// Runs the fetch/store/delete sequence for one job and classifies the
    /// outcome. All failures are decided locally; nothing escapes the loop.
    async fn execute(&self, job: &RecordingJob) -> ItemOutcome {
        debug!(worker = self.id, name = %job.name, "Downloading recording");

        let payload = match self.client.fetch(&job.name).await {
            Ok(payload) => payload,
            Err(err) if err.is_not_found() => {
                warn!(
                    worker = self.id,
                    name = %job.name,
                    "Recording not found on the remote server; dropping job"
                );
                return ItemOutcome::NotFound;
            }
            Err(err) => {
                warn!(worker = self.id, name = %job.name, error = %err, "Fetch failed");
                return ItemOutcome::Retry;
            }
        };

        if let Err(err) = self.store(job, &payload).await {
            // The remote copy stays in place: until a store succeeds it is
            // the only copy of the recording.
            warn!(worker = self.id, name = %job.name, error = %err, "Store failed");
            return ItemOutcome::Retry;
        }

        match self.client.delete(&job.name).await {
            Ok(()) => {
                debug!(worker = self.id, name = %job.name, "Remote recording deleted");
                ItemOutcome::Completed
            }
            Err(err) if err.is_not_found() => {
                debug!(
                    worker = self.id,
                    name = %job.name,
                    "Remote recording already gone; treating as cleaned up"
                );
                ItemOutcome::Completed
            }
            Err(err) => {
                warn!(worker = self.id, name = %job.name, error = %err, "Remote delete failed");
                ItemOutcome::Retry
            }
        }
    }

    async fn store(&self, job: &RecordingJob, payload: &[u8]) -> Result<(), StorageError> {
        let path = job.target_path();
        let mut sink = self.storage.create(&path).await?;
        sink.write_all(payload).await?;
        sink.flush().await?;
        sink.shutdown().await?;

        info!(
            worker = self.id,
            size_bytes = payload.len(),
            path = %path.display(),
            "Recording stored"
        );
        Ok(())
    }
}
