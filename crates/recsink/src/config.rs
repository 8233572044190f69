//! Downloader configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of concurrent download workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default retry window in seconds (30 minutes).
pub const DEFAULT_RETRY_WINDOW_SECS: u64 = 30 * 60;

/// Configuration for the recording downloader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Number of worker tasks, i.e. the maximum number of recordings
    /// downloaded at the same time. Must be at least 1.
    pub workers: usize,
    /// How long a job keeps being retried after its first transient failure,
    /// in seconds. The deadline is fixed on the first failure and never
    /// extended.
    pub retry_window_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            retry_window_secs: DEFAULT_RETRY_WINDOW_SECS,
        }
    }
}

impl DownloaderConfig {
    /// Creates a configuration with the given worker count and the default
    /// retry window.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// The retry window as a [`Duration`].
    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(Error::config("worker count must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloaderConfig::default();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.retry_window_secs, 30 * 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = DownloaderConfig::with_workers(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_retry_window_duration() {
        let config = DownloaderConfig {
            workers: 2,
            retry_window_secs: 90,
        };
        assert_eq!(config.retry_window(), Duration::from_secs(90));
    }
}
