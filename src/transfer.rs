//! Transfer worker: per-item download into the staging directory
//!
//! Each attempt resolves the item, streams the asset to the item's staging
//! path and checks the result is non-empty. A failed attempt deletes
//! whatever it wrote before the next attempt starts. The worker holds no
//! per-item state, so one instance can serve many concurrent fetches as
//! long as every fetch targets its own path.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::retry::{Backoff, ExponentialBackoff, retry_with_backoff};
use crate::staging::remove_if_exists;
use crate::types::{FetchedAsset, ItemId};
use crate::utils::format_megabytes;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Downloads items with bounded retry
#[derive(Clone)]
pub struct TransferWorker {
    resolver: Arc<dyn Resolver>,
    client: reqwest::Client,
    max_attempts: u32,
    backoff: Arc<dyn Backoff>,
    download_timeout: Duration,
}

impl TransferWorker {
    /// Create a worker using the retry policy from `retry`
    pub fn new(
        resolver: Arc<dyn Resolver>,
        client: reqwest::Client,
        retry: &RetryConfig,
        download_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            client,
            max_attempts: retry.max_attempts,
            backoff: Arc::new(ExponentialBackoff::from_config(retry)),
            download_timeout,
        }
    }

    /// Replace the backoff strategy
    pub fn with_backoff(mut self, backoff: Arc<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Maximum attempts per item
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fetch one item into `destination`
    ///
    /// # Errors
    ///
    /// [`Error::Transfer`] carrying the last attempt's error once every
    /// attempt has failed. No file is left at `destination` in that case.
    pub async fn fetch(&self, id: &ItemId, destination: &Path) -> Result<FetchedAsset> {
        let max_attempts = self.max_attempts;

        let outcome = retry_with_backoff(max_attempts, self.backoff.as_ref(), |attempt| async move {
            debug!(item_id = %id, attempt, max_attempts, "download attempt");
            match self.attempt(id, destination).await {
                Ok(asset) => Ok(asset),
                Err(e) => {
                    discard_partial(id, destination).await;
                    Err(e)
                }
            }
        })
        .await;

        match outcome {
            Ok(asset) => {
                info!(
                    item_id = %id,
                    path = ?destination,
                    size = %format_megabytes(asset.size_bytes),
                    title = %asset.title,
                    "downloaded"
                );
                Ok(asset)
            }
            Err(exhausted) => Err(Error::Transfer {
                id: id.to_string(),
                attempts: exhausted.attempts,
                last_cause: Box::new(exhausted.last_error),
            }),
        }
    }

    async fn attempt(&self, id: &ItemId, destination: &Path) -> Result<FetchedAsset> {
        let resolved = self.resolver.resolve(id).await?;
        let size_bytes = self.download(&resolved.url, destination).await?;
        if size_bytes == 0 {
            return Err(Error::EmptyDownload { id: id.to_string() });
        }
        Ok(FetchedAsset {
            title: resolved.title,
            size_bytes,
        })
    }

    /// Stream `url` into `destination` and return the size found on disk
    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        Ok(tokio::fs::metadata(destination).await?.len())
    }
}

async fn discard_partial(id: &ItemId, destination: &Path) {
    match remove_if_exists(destination).await {
        Ok(true) => debug!(item_id = %id, path = ?destination, "removed failed download"),
        Ok(false) => {}
        Err(e) => warn!(
            item_id = %id,
            path = ?destination,
            error = %e,
            "failed to remove partial download"
        ),
    }
}
