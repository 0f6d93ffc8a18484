//! Resolver client: item ID → download URL and display title
//!
//! One request per call and no retry; the transfer worker owns the retry
//! policy.

use crate::error::{Error, Result};
use crate::types::{ItemId, fallback_title};
use crate::utils::{endpoint_url, http_client};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// A resolved, downloadable asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// Direct download URL
    pub url: String,
    /// Display title
    pub title: String,
}

/// Turns an item ID into a download URL
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] when the upstream answers without a URL,
    /// with an error status or with an unreadable body, and
    /// [`Error::Network`] when the request itself fails.
    async fn resolve(&self, id: &ItemId) -> Result<ResolvedAsset>;
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

/// Resolver backed by the `GET <base>/<id>` HTTP service
#[derive(Clone, Debug)]
pub struct HttpResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResolver {
    /// Create a resolver with its own client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(http_client(timeout)?, base_url))
    }

    /// Create a resolver sharing an existing client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, id: &ItemId) -> Result<ResolvedAsset> {
        let url = endpoint_url(&self.base_url, id.as_str());
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Resolution {
                id: id.to_string(),
                reason: format!("resolver returned HTTP {}", status.as_u16()),
            });
        }

        let body: ResolveResponse = response.json().await.map_err(|e| Error::Resolution {
            id: id.to_string(),
            reason: format!("unreadable resolver response: {}", e),
        })?;

        let download_url = body
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Resolution {
                id: id.to_string(),
                reason: "no download URL returned".to_string(),
            })?;

        Ok(ResolvedAsset {
            url: download_url,
            title: title_from_filename(body.filename.as_deref(), id),
        })
    }
}

/// Derive a display title from the upstream file name
///
/// Drops a trailing `.mp3` and surrounding whitespace; falls back to
/// `Video <id>` when nothing is left.
pub fn title_from_filename(filename: Option<&str>, id: &ItemId) -> String {
    let title = filename
        .map(|name| name.strip_suffix(".mp3").unwrap_or(name).trim())
        .unwrap_or_default();
    if title.is_empty() {
        fallback_title(id)
    } else {
        title.to_string()
    }
}
