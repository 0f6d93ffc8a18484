//! Traits and types for batched archive uploads

use crate::types::ItemId;
use async_trait::async_trait;
use std::path::PathBuf;

/// One staged file to upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    /// Item identifier, also sent as external provenance ID
    pub id: ItemId,
    /// Staged file
    pub local_path: PathBuf,
    /// Display title
    pub title: String,
}

impl UploadRequest {
    /// Build a request
    pub fn new(
        id: impl Into<ItemId>,
        local_path: impl Into<PathBuf>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            local_path: local_path.into(),
            title: title.into(),
        }
    }
}

/// Per-item result of a batch upload
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Item identifier
    pub id: ItemId,
    /// Whether the archive confirmed the upload
    pub success: bool,
}

/// Trait for batched archive uploads
///
/// # Contract
///
/// - exactly one outcome per input item, in any order
/// - one external call per batch, never one per file
/// - when per-item results cannot be established, every item fails
/// - an empty batch returns an empty result without external calls
#[async_trait]
pub trait BatchUploader: Send + Sync {
    /// Upload `items` as a single batch
    async fn upload_batch(&self, items: &[UploadRequest]) -> Vec<UploadOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Every item of the batch reported as failed
pub fn all_failed(items: &[UploadRequest]) -> Vec<UploadOutcome> {
    items
        .iter()
        .map(|item| UploadOutcome {
            id: item.id.clone(),
            success: false,
        })
        .collect()
}
