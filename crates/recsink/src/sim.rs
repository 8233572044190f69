//! Simulated remote media client with randomized failure injection.
//!
//! Stands in for a real media server during demos and load experiments:
//! every call rolls for a not-found or server failure and sleeps for a
//! random latency, so the worker-pool failure paths actually get exercised.
//! Swapping in a production client is purely a wiring change since both
//! sides of the [`RecordingClient`] trait carry the same error contract.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::client::{ClientError, RecordingClient};

const PAYLOAD_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Failure odds and latency ranges for the [`SimulatedClient`].
///
/// Defaults match the reference environment this simulator was modeled on:
/// fetches miss 10% of the time and fail 10% of the time, deletes 5% each,
/// payloads are 1–999 bytes of uppercase alphanumerics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedClientConfig {
    /// Probability that a fetch reports the recording as missing.
    pub fetch_not_found_rate: f64,
    /// Probability that a fetch fails with a server error.
    pub fetch_failure_rate: f64,
    /// Probability that a delete reports the recording as missing.
    pub delete_not_found_rate: f64,
    /// Probability that a delete fails with a server error.
    pub delete_failure_rate: f64,
    /// Upper bound on the random payload size in bytes.
    pub max_payload_bytes: usize,
    /// Simulated fetch latency range in milliseconds.
    pub fetch_latency_min_ms: u64,
    pub fetch_latency_max_ms: u64,
    /// Simulated delete latency range in milliseconds.
    pub delete_latency_min_ms: u64,
    pub delete_latency_max_ms: u64,
}

impl Default for SimulatedClientConfig {
    fn default() -> Self {
        Self {
            fetch_not_found_rate: 0.10,
            fetch_failure_rate: 0.10,
            delete_not_found_rate: 0.05,
            delete_failure_rate: 0.05,
            max_payload_bytes: 999,
            fetch_latency_min_ms: 100,
            fetch_latency_max_ms: 1000,
            delete_latency_min_ms: 100,
            delete_latency_max_ms: 500,
        }
    }
}

impl SimulatedClientConfig {
    /// Zeroes all simulated latencies; failure odds are untouched.
    pub fn without_latency(mut self) -> Self {
        self.fetch_latency_min_ms = 0;
        self.fetch_latency_max_ms = 0;
        self.delete_latency_min_ms = 0;
        self.delete_latency_max_ms = 0;
        self
    }

    /// Disables failure injection; latencies are untouched.
    pub fn always_succeeding(mut self) -> Self {
        self.fetch_not_found_rate = 0.0;
        self.fetch_failure_rate = 0.0;
        self.delete_not_found_rate = 0.0;
        self.delete_failure_rate = 0.0;
        self
    }
}

/// A [`RecordingClient`] that serves random payloads and injects failures
/// according to its [`SimulatedClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedClient {
    config: SimulatedClientConfig,
}

impl SimulatedClient {
    pub fn new(config: SimulatedClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RecordingClient for SimulatedClient {
    async fn fetch(&self, name: &str) -> Result<Bytes, ClientError> {
        let roll = rand::random::<f64>();
        if roll < self.config.fetch_not_found_rate {
            return Err(ClientError::not_found(name));
        }
        if roll < self.config.fetch_not_found_rate + self.config.fetch_failure_rate {
            return Err(ClientError::server("simulated internal server error"));
        }

        let len = rand::random_range(1..=self.config.max_payload_bytes.max(1));
        let payload: Vec<u8> = (0..len)
            .map(|_| PAYLOAD_CHARS[rand::random_range(0..PAYLOAD_CHARS.len())])
            .collect();

        simulate_latency(
            self.config.fetch_latency_min_ms,
            self.config.fetch_latency_max_ms,
        )
        .await;

        Ok(Bytes::from(payload))
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let roll = rand::random::<f64>();
        if roll < self.config.delete_not_found_rate {
            return Err(ClientError::not_found(name));
        }
        if roll < self.config.delete_not_found_rate + self.config.delete_failure_rate {
            return Err(ClientError::server("simulated internal server error"));
        }

        simulate_latency(
            self.config.delete_latency_min_ms,
            self.config.delete_latency_max_ms,
        )
        .await;

        Ok(())
    }
}

async fn simulate_latency(min_ms: u64, max_ms: u64) {
    if max_ms == 0 {
        return;
    }
    let wait_ms = if min_ms >= max_ms {
        max_ms
    } else {
        rand::random_range(min_ms..=max_ms)
    };
    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulatedClientConfig {
        SimulatedClientConfig::default().without_latency()
    }

    #[tokio::test]
    async fn test_certain_not_found() {
        let client = SimulatedClient::new(SimulatedClientConfig {
            fetch_not_found_rate: 1.0,
            fetch_failure_rate: 0.0,
            ..config()
        });

        let err = client.fetch("rec-001").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_certain_server_failure_is_transient() {
        let client = SimulatedClient::new(SimulatedClientConfig {
            fetch_not_found_rate: 0.0,
            fetch_failure_rate: 1.0,
            ..config()
        });

        let err = client.fetch("rec-001").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_successful_fetch_yields_bounded_payload() {
        let client = SimulatedClient::new(config().always_succeeding());

        for _ in 0..16 {
            let payload = client.fetch("rec-001").await.unwrap();
            assert!(!payload.is_empty());
            assert!(payload.len() <= 999);
            assert!(payload.iter().all(|b| PAYLOAD_CHARS.contains(b)));
        }
    }

    #[tokio::test]
    async fn test_successful_delete() {
        let client = SimulatedClient::new(config().always_succeeding());
        client.delete("rec-001").await.unwrap();
    }
}
