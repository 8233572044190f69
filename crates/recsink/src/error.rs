//! Crate-wide error types.

use thiserror::Error;

use crate::job::RecordingJob;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the downloader itself.
///
/// Per-job failures (client or storage) never appear here; they are handled
/// inside the worker loop and reported through [`DownloaderEvent`] instead.
///
/// [`DownloaderEvent`]: crate::downloader::DownloaderEvent
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The downloader has been stopped and its queue no longer accepts jobs.
    ///
    /// The rejected job is handed back so the caller can persist or reroute
    /// it, in the spirit of a channel `SendError`.
    #[error("Submission rejected: downloader is stopped")]
    SubmissionRejected { job: RecordingJob },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns the job carried by a [`Error::SubmissionRejected`], if any.
    pub fn into_rejected_job(self) -> Option<RecordingJob> {
        match self {
            Self::SubmissionRejected { job } => Some(job),
            Self::Configuration(_) => None,
        }
    }
}
