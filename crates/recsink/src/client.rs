//! Remote media client abstraction.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors returned by a [`RecordingClient`].
///
/// The worker only cares about one distinction: not-found is terminal for
/// the affected call, every other variant is transient and retried within
/// the job's retry window. Match on [`is_not_found`](ClientError::is_not_found)
/// / [`is_transient`](ClientError::is_transient) rather than on concrete
/// variants so client implementations stay free to grow new ones.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The recording does not exist on the remote server.
    #[error("Recording `{name}` not found on the remote server")]
    NotFound { name: String },

    /// The remote server reported an internal failure.
    #[error("Remote server failure: {reason}")]
    Server { reason: String },

    /// The remote server could not be reached.
    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    /// The remote call did not complete in time.
    #[error("Remote call timed out: {reason}")]
    Timeout { reason: String },
}

impl ClientError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn server(reason: impl Into<String>) -> Self {
        Self::Server {
            reason: reason.into(),
        }
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout {
            reason: reason.into(),
        }
    }

    /// Terminal outcome: the recording is gone and retrying cannot help.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the failure is assumed recoverable by retrying later.
    pub fn is_transient(&self) -> bool {
        !self.is_not_found()
    }
}

/// Client for the remote media server holding the recordings.
///
/// Both calls are plain request/response operations from the worker's point
/// of view; timeouts and hangs are the implementation's business. The
/// simulated client in [`crate::sim`] and any production client differ only
/// in which implementation is wired in, never in worker logic.
#[async_trait]
pub trait RecordingClient: Send + Sync {
    /// Fetches the raw bytes of the named recording.
    async fn fetch(&self, name: &str) -> Result<Bytes, ClientError>;

    /// Deletes the named recording from the remote server.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_terminal() {
        let err = ClientError::not_found("rec-001");
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_other_errors_are_transient() {
        for err in [
            ClientError::server("internal error"),
            ClientError::connection("connection refused"),
            ClientError::timeout("no response after 30s"),
        ] {
            assert!(err.is_transient(), "{err} should be transient");
            assert!(!err.is_not_found());
        }
    }

    #[test]
    fn test_error_display_names_the_recording() {
        let err = ClientError::not_found("rec-001");
        assert!(err.to_string().contains("rec-001"));
    }
}
