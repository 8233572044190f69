//! Downloader orchestration: lifecycle, submission, outcome events.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::RecordingClient;
use crate::config::DownloaderConfig;
use crate::error::{Error, Result};
use crate::job::{RecordingJob, RetryableJob};
use crate::queue::JobQueue;
use crate::storage::RecordingStorage;
use crate::worker::DownloadWorker;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a job was dropped without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The remote server does not know the recording.
    NotFound,
    /// Transient failures persisted past the retry window.
    RetryWindowExpired,
    /// A retry could not be requeued because the queue had already closed.
    QueueClosed,
}

/// Per-job outcome events, broadcast to any number of subscribers.
///
/// Purely observational: the downloader never depends on receivers existing
/// and ignores send results. Slow subscribers may lag and miss events; the
/// channel is not a delivery guarantee.
#[derive(Debug, Clone)]
pub enum DownloaderEvent {
    /// The job was stored locally and removed remotely.
    JobCompleted { job: RecordingJob },
    /// A transient failure sent the job back to the queue.
    JobRequeued { job: RecordingJob },
    /// The job was dropped for good.
    JobAbandoned {
        job: RecordingJob,
        reason: AbandonReason,
    },
}

struct Lifecycle {
    running: bool,
    /// Set once an effective stop has run; a stopped downloader does not
    /// restart.
    finished: bool,
    workers: Option<JoinSet<()>>,
}

/// Bounded concurrent downloader for remote recordings.
///
/// Owns the [`JobQueue`] and a fixed pool of worker tasks. Jobs are
/// submitted by some external producer, fetched from the remote server,
/// written to local storage, then deleted remotely; transient failures are
/// retried within a fixed window. At most `config.workers` downloads run at
/// any instant.
///
/// ```no_run
/// use std::sync::Arc;
/// use recsink::{DownloaderConfig, FsStorage, RecordingDownloader, RecordingJob, SimulatedClient};
///
/// # async fn demo() -> recsink::Result<()> {
/// let downloader = RecordingDownloader::new(
///     Arc::new(SimulatedClient::default()),
///     Arc::new(FsStorage::new()),
///     DownloaderConfig::with_workers(2),
/// )?;
///
/// downloader.start().await;
/// downloader.submit(RecordingJob::new("rec-001", "/var/recordings", "rec-001.wav"))?;
///
/// let recoverable = downloader.stop().await;
/// println!("{} jobs left for a future run", recoverable.len());
/// # Ok(())
/// # }
/// ```
pub struct RecordingDownloader {
    config: DownloaderConfig,
    queue: Arc<JobQueue>,
    client: Arc<dyn RecordingClient>,
    storage: Arc<dyn RecordingStorage>,
    shutdown: CancellationToken,
    events: broadcast::Sender<DownloaderEvent>,
    lifecycle: Mutex<Lifecycle>,
}

impl RecordingDownloader {
    /// Creates a downloader with the given collaborators.
    ///
    /// Fails with [`Error::Configuration`] when the worker count is zero.
    /// Workers are spawned by [`start`](Self::start), not here.
    pub fn new(
        client: Arc<dyn RecordingClient>,
        storage: Arc<dyn RecordingStorage>,
        config: DownloaderConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            workers = config.workers,
            retry_window_secs = config.retry_window_secs,
            "Recording downloader created"
        );

        Ok(Self {
            config,
            queue: Arc::new(JobQueue::new()),
            client,
            storage,
            shutdown: CancellationToken::new(),
            events,
            lifecycle: Mutex::new(Lifecycle {
                running: false,
                finished: false,
                workers: None,
            }),
        })
    }

    /// Queues a job for download.
    ///
    /// Accepted jobs enter the tail of the queue with no retry deadline.
    /// Once the downloader has been stopped the queue is closed and the job
    /// comes back inside [`Error::SubmissionRejected`].
    pub fn submit(&self, job: RecordingJob) -> Result<()> {
        let name = job.name.clone();
        match self.queue.push(RetryableJob::new(job)) {
            Ok(()) => {
                debug!(name = %name, queue_depth = self.queue.len(), "Job submitted");
                Ok(())
            }
            Err(rejected) => {
                warn!(name = %name, "Submission rejected; downloader is stopped");
                Err(Error::SubmissionRejected {
                    job: rejected.into_job(),
                })
            }
        }
    }

    /// Spawns the worker pool. Idempotent: starting a running downloader
    /// logs and returns. A downloader that has been stopped stays stopped;
    /// construct a new one instead.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.running {
            info!("Downloader already running");
            return;
        }
        if lifecycle.finished {
            warn!("Downloader has been stopped and cannot be restarted");
            return;
        }

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            let worker = DownloadWorker {
                id,
                queue: Arc::clone(&self.queue),
                client: Arc::clone(&self.client),
                storage: Arc::clone(&self.storage),
                retry_window: self.config.retry_window(),
                shutdown: self.shutdown.clone(),
                events: self.events.clone(),
            };
            workers.spawn(worker.run());
        }
        lifecycle.workers = Some(workers);
        lifecycle.running = true;

        info!(workers = self.config.workers, "Downloader started");
    }

    /// Stops the pool and returns the jobs that never got processed.
    ///
    /// Closes the queue to new submissions, signals the workers to exit
    /// after their current item, waits for all of them to finish, then
    /// drains the queue. The returned jobs are the recoverable remainder a
    /// caller may persist or resubmit elsewhere. Jobs abandoned along the
    /// way (not-found, expired retries) are not part of it.
    ///
    /// Idempotent: stopping a downloader that is not running returns an
    /// empty vector immediately.
    pub async fn stop(&self) -> Vec<RecordingJob> {
        let workers = {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.running {
                debug!("Downloader already stopped");
                return Vec::new();
            }
            lifecycle.running = false;
            lifecycle.finished = true;

            // Close first so nothing new lands, then signal the workers.
            self.queue.close();
            self.shutdown.cancel();
            lifecycle.workers.take()
        };

        if let Some(mut workers) = workers {
            while workers.join_next().await.is_some() {}
        }

        let remaining: Vec<RecordingJob> = self
            .queue
            .drain()
            .into_iter()
            .map(RetryableJob::into_job)
            .collect();

        info!(recoverable = remaining.len(), "Downloader stopped");
        remaining
    }

    /// Subscribes to per-job outcome events.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloaderEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().running
    }

    /// Number of jobs currently waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedClient;
    use crate::storage::MemoryStorage;

    fn downloader(workers: usize) -> Result<RecordingDownloader> {
        RecordingDownloader::new(
            Arc::new(SimulatedClient::default()),
            Arc::new(MemoryStorage::new()),
            DownloaderConfig::with_workers(workers),
        )
    }

    #[tokio::test]
    async fn test_new_rejects_zero_workers() {
        assert!(matches!(downloader(0), Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_a_noop() {
        let downloader = downloader(2).unwrap();
        assert!(downloader.stop().await.is_empty());
        assert!(!downloader.is_running());
    }

    #[tokio::test]
    async fn test_submit_before_start_is_queued() {
        let downloader = downloader(1).unwrap();
        downloader
            .submit(RecordingJob::new("rec-001", "/tmp", "rec-001.wav"))
            .unwrap();
        assert_eq!(downloader.queue_depth(), 1);
    }
}
