//! Download job entities.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// One recording to fetch from the remote server, with its local destination.
///
/// Jobs are value objects: once submitted they are not mutated, only moved
/// between the queue and a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingJob {
    /// Identifier of the recording on the remote server.
    pub name: String,
    /// Local directory the recording is stored under.
    pub target_dir: PathBuf,
    /// File name the recording is stored as.
    pub target_file: String,
}

impl RecordingJob {
    pub fn new(
        name: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        target_file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_dir: target_dir.into(),
            target_file: target_file.into(),
        }
    }

    /// Full local path the recording is written to.
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(&self.target_file)
    }
}

/// Outcome of a retry decision after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Push the job back to the queue. `first_failure` is true when this
    /// failure is the one that fixed the deadline.
    Retry { first_failure: bool },
    /// The retry window has elapsed; the job is dropped.
    Abandon,
}

/// A [`RecordingJob`] plus retry bookkeeping, as carried by the queue.
///
/// `retry_deadline` is absent until the job's first transient failure, then
/// set exactly once and never extended. No locking is needed around it:
/// exactly one holder (the queue or a single worker) owns the item at any
/// instant.
#[derive(Debug)]
pub struct RetryableJob {
    job: RecordingJob,
    retry_deadline: Option<Instant>,
}

impl RetryableJob {
    /// Wraps a freshly submitted job; no deadline is set.
    pub fn new(job: RecordingJob) -> Self {
        Self {
            job,
            retry_deadline: None,
        }
    }

    pub fn job(&self) -> &RecordingJob {
        &self.job
    }

    pub fn into_job(self) -> RecordingJob {
        self.job
    }

    /// Deadline after which the job is no longer retried, if one has been set.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_deadline
    }

    /// Records a transient failure at `now` and decides what happens next.
    ///
    /// The first failure fixes the deadline at `now + window` and always
    /// requeues. Later failures requeue while `now` is before the deadline
    /// and abandon once it has been reached.
    pub(crate) fn mark_failed(&mut self, now: Instant, window: Duration) -> RetryDecision {
        match self.retry_deadline {
            None => {
                self.retry_deadline = Some(now + window);
                RetryDecision::Retry {
                    first_failure: true,
                }
            }
            Some(deadline) if now < deadline => RetryDecision::Retry {
                first_failure: false,
            },
            Some(_) => RetryDecision::Abandon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> RecordingJob {
        RecordingJob::new("rec-001", "/var/recordings", "rec-001.wav")
    }

    #[test]
    fn test_target_path_joins_dir_and_file() {
        assert_eq!(
            job().target_path(),
            PathBuf::from("/var/recordings/rec-001.wav")
        );
    }

    #[tokio::test]
    async fn test_first_failure_fixes_deadline_and_retries() {
        let mut item = RetryableJob::new(job());
        assert!(item.retry_deadline().is_none());

        let now = Instant::now();
        let window = Duration::from_secs(1800);
        let decision = item.mark_failed(now, window);

        assert_eq!(
            decision,
            RetryDecision::Retry {
                first_failure: true
            }
        );
        assert_eq!(item.retry_deadline(), Some(now + window));
    }

    #[tokio::test]
    async fn test_deadline_is_not_extended_by_later_failures() {
        let mut item = RetryableJob::new(job());
        let now = Instant::now();
        let window = Duration::from_secs(1800);

        item.mark_failed(now, window);
        let deadline = item.retry_deadline();

        let decision = item.mark_failed(now + Duration::from_secs(60), window);
        assert_eq!(
            decision,
            RetryDecision::Retry {
                first_failure: false
            }
        );
        assert_eq!(item.retry_deadline(), deadline);
    }

    #[tokio::test]
    async fn test_failure_at_deadline_abandons() {
        let mut item = RetryableJob::new(job());
        let now = Instant::now();
        let window = Duration::from_secs(1800);

        item.mark_failed(now, window);
        assert_eq!(item.mark_failed(now + window, window), RetryDecision::Abandon);
    }

    #[tokio::test]
    async fn test_zero_window_abandons_on_second_failure() {
        let mut item = RetryableJob::new(job());
        let now = Instant::now();

        let first = item.mark_failed(now, Duration::ZERO);
        assert_eq!(
            first,
            RetryDecision::Retry {
                first_failure: true
            }
        );
        assert_eq!(item.mark_failed(now, Duration::ZERO), RetryDecision::Abandon);
    }
}
