//! Recsink: bounded concurrent downloader for remote recordings.
//!
//! This crate offloads recordings from a remote media server: each job is
//! fetched, written to local storage, then deleted remotely, with a hard
//! bound on how many downloads run at the same time. Transient failures are
//! retried within a fixed per-job window; graceful shutdown drains the queue
//! and hands unprocessed jobs back to the caller.
//!
//! ## Core Types
//!
//! - [`RecordingDownloader`] - Orchestrator owning the queue and worker pool
//! - [`DownloaderConfig`] - Worker count and retry window
//! - [`RecordingJob`] - One recording to fetch and where to store it
//! - [`RetryableJob`] - A job plus its retry deadline, as queued
//! - [`JobQueue`] - Closeable multi-producer/multi-consumer queue
//! - [`DownloaderEvent`] - Per-job outcome events for subscribers
//!
//! ## Collaborators
//!
//! - [`RecordingClient`] - Trait for the remote media server (fetch/delete)
//! - [`RecordingStorage`] - Trait for local sinks ([`FsStorage`],
//!   [`MemoryStorage`])
//! - [`SimulatedClient`] - Randomized failure-injecting client for demos
//!   and experiments

pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod job;
pub mod queue;
pub mod sim;
pub mod storage;
mod worker;

pub use client::{ClientError, RecordingClient};
pub use config::{DEFAULT_RETRY_WINDOW_SECS, DEFAULT_WORKERS, DownloaderConfig};
pub use downloader::{AbandonReason, DownloaderEvent, RecordingDownloader};
pub use error::{Error, Result};
pub use job::{RecordingJob, RetryableJob};
pub use queue::JobQueue;
pub use sim::{SimulatedClient, SimulatedClientConfig};
pub use storage::{FsStorage, MemoryStorage, RecordingStorage, StorageError, StorageSink};
