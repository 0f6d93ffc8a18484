//! # channel-archiver
//!
//! Idempotent ingestion of a channel's media items into a public archive.
//!
//! Each run lists the items of a channel, downloads every item that the
//! ledger does not know yet, uploads the downloaded files to the archive
//! in a single batch, and records the confirmed uploads in a JSON ledger.
//! Running again never uploads an item twice.
//!
//! ## Quick Start
//!
//! ```no_run
//! use channel_archiver::archive::ScriptedBatchUploader;
//! use channel_archiver::{
//!     HttpLister, HttpResolver, LedgerStore, Pipeline, RetryConfig, StagingArea,
//!     TransferWorker,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let timeout = Duration::from_secs(30);
//!     let lister = HttpLister::new("https://lister.example/api/channel", timeout)?;
//!     let resolver = HttpResolver::new("https://resolver.example/api/mp3", timeout)?;
//!     let worker = TransferWorker::new(
//!         Arc::new(resolver),
//!         reqwest::Client::new(),
//!         &RetryConfig::default(),
//!         Duration::from_secs(60),
//!     );
//!
//!     let store = LedgerStore::new("downloads.json");
//!     let pipeline = Pipeline::new(
//!         Arc::new(lister),
//!         worker,
//!         Arc::new(ScriptedBatchUploader::new()),
//!         store.clone(),
//!         StagingArea::new("temp_downloads", "webm"),
//!         "https://archive.org/serve/my-archive",
//!     );
//!
//!     let report = pipeline.run_once("UC123", store.load().await).await?;
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Batched archive uploads
pub mod archive;
/// Ledger commit collaborator
pub mod commit;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Persistent record of processed items
pub mod ledger;
/// Channel listing client
pub mod lister;
/// Run orchestration
pub mod pipeline;
/// Item resolution client
pub mod resolver;
/// Retry logic with backoff
pub mod retry;
/// Staging directory management
pub mod staging;
/// Per-item download with retry
pub mod transfer;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use archive::{BatchUploader, CommandBatchUploader, ScriptedBatchUploader, UploadOutcome};
pub use commit::{GitCommitter, LedgerCommitter, NoOpCommitter};
pub use config::{
    ArchiveConfig, CommitConfig, Config, LedgerConfig, RetryConfig, ServiceConfig,
    TransferConfig,
};
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerRecord, LedgerStore, LedgerWarning};
pub use lister::{HttpLister, ItemLister};
pub use pipeline::{Pipeline, RunReport};
pub use resolver::{HttpResolver, ResolvedAsset, Resolver};
pub use staging::StagingArea;
pub use transfer::TransferWorker;
pub use types::{Item, ItemId, ItemStatus, RunSummary};

/// Run the pipeline once, cancelling it on a termination signal.
///
/// A first signal cancels the run: during listing or the transfer phase it
/// stops new work, skips the upload and returns [`Error::Cancelled`] after
/// cleanup; once the upload has started the run is allowed to finish. A
/// second signal abandons the run wherever it is, which kills a running
/// upload program, sweeps the staging directory and returns
/// [`Error::Cancelled`] without recording anything further.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use channel_archiver::{Pipeline, run_with_shutdown};
///
/// # async fn example(pipeline: Pipeline) -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = pipeline.store().load().await;
/// let report = run_with_shutdown(&pipeline, "UC123", ledger).await?;
/// println!("{}", report.summary);
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(
    pipeline: &Pipeline,
    channel_id: &str,
    ledger: Ledger,
) -> Result<RunReport> {
    run_until_signalled(pipeline, channel_id, ledger, wait_for_signal).await
}

async fn run_until_signalled<F, Fut>(
    pipeline: &Pipeline,
    channel_id: &str,
    ledger: Ledger,
    mut next_signal: F,
) -> Result<RunReport>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    // Boxed so the run can be dropped before returning
    let mut run = Box::pin(pipeline.run_once(channel_id, ledger));

    tokio::select! {
        result = &mut run => return result,
        _ = next_signal() => {
            tracing::info!("shutting down, signal again to abort immediately");
            pipeline.cancel_token().cancel();
        }
    }

    tokio::select! {
        result = &mut run => return result,
        _ = next_signal() => {}
    }

    tracing::warn!("second signal received, abandoning the run");
    drop(run);
    pipeline.clear_staging().await;
    Err(Error::Cancelled)
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
