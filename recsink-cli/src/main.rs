use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use recsink::{
    DownloaderConfig, DownloaderEvent, FsStorage, MemoryStorage, RecordingDownloader,
    RecordingJob, RecordingStorage, SimulatedClient, SimulatedClientConfig,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent download workers
    #[arg(short, long, default_value_t = 2)]
    workers: usize,

    /// Number of recordings the producer submits before finishing
    #[arg(short, long, default_value_t = 50)]
    jobs: usize,

    /// Directory downloaded recordings are stored under
    #[arg(short, long, default_value = "recordings")]
    output_dir: PathBuf,

    /// Keep recordings in memory instead of writing them to disk
    #[clap(long)]
    memory: bool,

    /// How long transient failures keep being retried, in seconds
    #[clap(long, default_value_t = recsink::DEFAULT_RETRY_WINDOW_SECS)]
    retry_window_secs: u64,

    /// Write jobs recovered at shutdown to this file as JSON
    #[clap(long)]
    recovered_out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let client = Arc::new(SimulatedClient::new(SimulatedClientConfig::default()));
    let storage: Arc<dyn RecordingStorage> = if args.memory {
        info!("Storing recordings in memory");
        Arc::new(MemoryStorage::new())
    } else {
        info!(dir = %args.output_dir.display(), "Storing recordings on disk");
        Arc::new(FsStorage::new())
    };

    let config = DownloaderConfig {
        workers: args.workers,
        retry_window_secs: args.retry_window_secs,
    };
    let downloader = Arc::new(
        RecordingDownloader::new(client, storage, config)
            .context("Invalid downloader configuration")?,
    );
    let mut events = downloader.subscribe();

    downloader.start().await;

    let cancel = CancellationToken::new();
    let producer = tokio::spawn(produce(
        Arc::clone(&downloader),
        cancel.clone(),
        args.jobs,
        args.output_dir.clone(),
    ));

    // Tally outcomes until every submitted job has settled or the user
    // interrupts the run.
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut completed = 0usize;
    let mut requeues = 0usize;
    let mut abandoned = 0usize;
    while completed + abandoned < args.jobs {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received; stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(DownloaderEvent::JobCompleted { .. }) => completed += 1,
                Ok(DownloaderEvent::JobRequeued { .. }) => requeues += 1,
                Ok(DownloaderEvent::JobAbandoned { job, reason }) => {
                    abandoned += 1;
                    debug!(name = %job.name, ?reason, "Job abandoned");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    cancel.cancel();
    let submitted = producer.await.context("Producer task panicked")?;

    let remaining = downloader.stop().await;
    info!(
        submitted,
        completed,
        requeues,
        abandoned,
        recovered = remaining.len(),
        "Run finished"
    );

    if !remaining.is_empty() {
        println!(
            "Recovered jobs: {}",
            remaining
                .iter()
                .map(|job| job.name.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        );
    }

    if let Some(path) = args.recovered_out {
        let json = serde_json::to_string_pretty(&remaining)
            .context("Failed to serialize recovered jobs")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), count = remaining.len(), "Recovered jobs written");
    }

    Ok(())
}

/// Submits `total` jobs with a short random pause between them, the way
/// recordings trickle in on a busy server. Stops early when cancelled or
/// when the downloader refuses a submission.
async fn produce(
    downloader: Arc<RecordingDownloader>,
    cancel: CancellationToken,
    total: usize,
    output_dir: PathBuf,
) -> usize {
    let mut submitted = 0;
    for n in 0..total {
        let pause = Duration::from_millis(rand::random_range(50..=100));
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }

        let name = format!("recording-{n:04}");
        let job = RecordingJob::new(name.clone(), output_dir.clone(), format!("{name}.wav"));
        match downloader.submit(job) {
            Ok(()) => submitted += 1,
            Err(err) => {
                warn!(error = %err, "Submission rejected; producer stopping");
                break;
            }
        }
    }
    debug!(submitted, "Producer finished");
    submitted
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}
