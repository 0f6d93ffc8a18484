//! In-process batch uploader with scripted outcomes
//!
//! Used by tests and dry runs. Every item succeeds unless it was named in
//! [`ScriptedBatchUploader::failing`] or the whole batch was set to fail.

use super::traits::{BatchUploader, UploadOutcome, UploadRequest, all_failed};
use crate::types::ItemId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Batch uploader that never leaves the process
#[derive(Debug, Default)]
pub struct ScriptedBatchUploader {
    failing: HashSet<ItemId>,
    fail_whole_batch: bool,
    batches: Mutex<Vec<Vec<UploadRequest>>>,
}

impl ScriptedBatchUploader {
    /// Uploader accepting every item
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the given items as failed
    pub fn failing<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemId>,
    {
        self.failing.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Behave like an upload whose output could not be interpreted
    pub fn fail_whole_batch(mut self) -> Self {
        self.fail_whole_batch = true;
        self
    }

    /// Every non-empty batch received so far
    pub fn batches(&self) -> Vec<Vec<UploadRequest>> {
        self.batches
            .lock()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    /// Number of upload calls made
    pub fn calls(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or_default()
    }
}

#[async_trait]
impl BatchUploader for ScriptedBatchUploader {
    async fn upload_batch(&self, items: &[UploadRequest]) -> Vec<UploadOutcome> {
        if items.is_empty() {
            return Vec::new();
        }

        if let Ok(mut batches) = self.batches.lock() {
            batches.push(items.to_vec());
        }

        if self.fail_whole_batch {
            return all_failed(items);
        }

        items
            .iter()
            .map(|item| UploadOutcome {
                id: item.id.clone(),
                success: !self.failing.contains(&item.id),
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
