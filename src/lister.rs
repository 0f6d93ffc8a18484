//! Lister client: channel ID → item IDs

use crate::error::{Error, Result};
use crate::types::ItemId;
use crate::utils::{endpoint_url, http_client};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Discovers the items of a channel
#[async_trait]
pub trait ItemLister: Send + Sync {
    /// List every item ID of `channel_id`
    ///
    /// An empty listing is an error: it signals an upstream problem, not
    /// "nothing to do".
    async fn list(&self, channel_id: &str) -> Result<Vec<ItemId>>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    videos: Option<Vec<String>>,
}

/// Lister backed by the `GET <base>/<channel>` HTTP service
#[derive(Clone, Debug)]
pub struct HttpLister {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLister {
    /// Create a lister with its own client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(http_client(timeout)?, base_url))
    }

    /// Create a lister sharing an existing client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ItemLister for HttpLister {
    async fn list(&self, channel_id: &str) -> Result<Vec<ItemId>> {
        let listing_error = |reason: String| Error::Listing {
            channel: channel_id.to_string(),
            reason,
        };

        let url = endpoint_url(&self.base_url, channel_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| listing_error(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(listing_error(format!("lister returned HTTP {}", status.as_u16())));
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| listing_error(format!("unreadable lister response: {}", e)))?;

        let ids: Vec<ItemId> = body
            .videos
            .unwrap_or_default()
            .into_iter()
            .map(ItemId::from)
            .collect();

        if ids.is_empty() {
            return Err(listing_error("no videos found for this channel".to_string()));
        }

        tracing::info!(channel = channel_id, count = ids.len(), "listed channel items");
        Ok(ids)
    }
}
