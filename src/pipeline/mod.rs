//! Pipeline orchestrator for one ingestion run
//!
//! A run goes through three phases:
//! 1. Transfer - every listed item missing from the ledger is fetched into
//!    the staging directory, with bounded concurrency
//! 2. Upload - once phase 1 has fully drained, all staged items go to the
//!    archive in a single batch; confirmed items are recorded in the ledger
//! 3. Finish - the ledger is persisted and committed when something was
//!    recorded, then every staged file is removed and the staging directory
//!    is swept
//!
//! Phase 3 cleanup runs on every exit path once the staging directory has
//! been prepared, including a failed listing and cancellation.

use crate::archive::{BatchUploader, UploadRequest};
use crate::commit::{LedgerCommitter, NoOpCommitter};
use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerStore};
use crate::lister::ItemLister;
use crate::staging::StagingArea;
use crate::transfer::TransferWorker;
use crate::types::{Item, ItemId, ItemStatus, RunSummary};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Result of a completed run
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Counters for this run
    pub summary: RunSummary,
    /// Ledger including the records added by this run
    pub ledger: Ledger,
}

/// Drives one channel through transfer, upload and cleanup
pub struct Pipeline {
    lister: Arc<dyn ItemLister>,
    worker: TransferWorker,
    uploader: Arc<dyn BatchUploader>,
    committer: Arc<dyn LedgerCommitter>,
    store: LedgerStore,
    staging: StagingArea,
    archive_base_url: String,
    max_concurrent: usize,
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline
    ///
    /// Starts with no commit collaborator, four concurrent transfers and a
    /// fresh cancellation token.
    pub fn new(
        lister: Arc<dyn ItemLister>,
        worker: TransferWorker,
        uploader: Arc<dyn BatchUploader>,
        store: LedgerStore,
        staging: StagingArea,
        archive_base_url: impl Into<String>,
    ) -> Self {
        Self {
            lister,
            worker,
            uploader,
            committer: Arc::new(NoOpCommitter),
            store,
            staging,
            archive_base_url: archive_base_url.into().trim_end_matches('/').to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set the collaborator invoked after the ledger is persisted
    pub fn with_committer(mut self, committer: Arc<dyn LedgerCommitter>) -> Self {
        self.committer = committer;
        self
    }

    /// Bound the number of concurrent transfers (at least one)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Token that cancels a run in progress
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Ledger store this pipeline persists to
    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Public URL an uploaded item is served under
    pub fn archive_url(&self, id: &ItemId) -> String {
        format!("{}/{}", self.archive_base_url, self.staging.file_name(id))
    }

    /// Process every listed item of `channel_id` not yet in `ledger`
    ///
    /// Item-level failures are counted in the summary and never abort the
    /// run. The returned ledger holds every record added by the run.
    ///
    /// # Errors
    ///
    /// - [`Error::Listing`] when the channel cannot be listed or is empty
    /// - [`Error::Cancelled`] when the run was cancelled before the upload,
    ///   including while the channel was still being listed
    /// - [`Error::Io`] when the staging directory cannot be created
    pub async fn run_once(&self, channel_id: &str, ledger: Ledger) -> Result<RunReport> {
        self.staging.prepare().await?;
        self.sweep("startup").await;

        let mut staged = Vec::new();
        let result = self.run_phases(channel_id, ledger, &mut staged).await;

        let removed = self
            .staging
            .remove_staged(staged.iter().map(PathBuf::as_path))
            .await;
        debug!(removed, "removed staged files");
        self.sweep("cleanup").await;

        match &result {
            Ok(report) => info!(
                channel = %channel_id,
                processed = report.summary.processed,
                skipped = report.summary.skipped,
                failed = report.summary.failed,
                "run complete"
            ),
            Err(e) => warn!(channel = %channel_id, error = %e, "run aborted"),
        }

        result
    }

    async fn run_phases(
        &self,
        channel_id: &str,
        mut ledger: Ledger,
        staged: &mut Vec<PathBuf>,
    ) -> Result<RunReport> {
        let listed = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                info!(channel = %channel_id, "cancelled while listing");
                return Err(Error::Cancelled);
            }
            listed = self.lister.list(channel_id) => listed?,
        };
        if listed.is_empty() {
            return Err(Error::Listing {
                channel: channel_id.to_string(),
                reason: "no items listed".to_string(),
            });
        }
        let mut summary = RunSummary::default();

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for id in listed.iter() {
            if !seen.insert(id) {
                debug!(item_id = %id, "duplicate in listing, skipping");
                summary.skipped += 1;
                continue;
            }
            if ledger.contains(id) {
                debug!(item_id = %id, "already processed, skipping");
                summary.skipped += 1;
                continue;
            }
            match self.staging.item_path(id) {
                Ok(path) => {
                    staged.push(path.clone());
                    pending.push((Item::pending(id.clone()), path));
                }
                Err(e) => {
                    warn!(item_id = %id, error = %e, "rejecting item");
                    summary.failed += 1;
                }
            }
        }

        info!(
            channel = %channel_id,
            listed = listed.len(),
            pending = pending.len(),
            skipped = summary.skipped,
            "discovered items"
        );

        let transferred = self.transfer_all(pending).await;
        if self.cancel_token.is_cancelled() {
            info!("run cancelled, skipping upload");
            return Err(Error::Cancelled);
        }

        let (mut downloaded, failed): (Vec<Item>, Vec<Item>) = transferred
            .into_iter()
            .partition(|item| item.status == ItemStatus::Downloaded);
        summary.failed += failed.len();

        self.upload_all(&mut downloaded, &mut ledger, &mut summary)
            .await;

        if summary.processed > 0 {
            self.persist_and_commit(&ledger).await;
        }

        Ok(RunReport { summary, ledger })
    }

    /// Phase 1: fetch every pending item, stopping early on cancellation
    async fn transfer_all(&self, pending: Vec<(Item, PathBuf)>) -> Vec<Item> {
        let worker = &self.worker;
        let transfers = stream::iter(pending)
            .map(|(mut item, path)| async move {
                match worker.fetch(&item.id, &path).await {
                    Ok(asset) => item.mark_downloaded(path, asset),
                    Err(e) => {
                        warn!(item_id = %item.id, error = %e, "transfer failed");
                        item.status = ItemStatus::Failed;
                    }
                }
                item
            })
            .buffer_unordered(self.max_concurrent)
            .take_until(self.cancel_token.cancelled());
        let mut transfers = std::pin::pin!(transfers);

        let mut done = Vec::new();
        while let Some(item) = transfers.next().await {
            done.push(item);
        }
        done
    }

    /// Phase 2: one batch upload, then ledger records for confirmed items
    async fn upload_all(
        &self,
        downloaded: &mut [Item],
        ledger: &mut Ledger,
        summary: &mut RunSummary,
    ) {
        let requests: Vec<UploadRequest> = downloaded
            .iter()
            .filter_map(|item| {
                let path = item.local_path.clone()?;
                Some(UploadRequest::new(item.id.clone(), path, item.title()))
            })
            .collect();
        if requests.is_empty() {
            return;
        }

        info!(
            uploader = self.uploader.name(),
            count = requests.len(),
            "uploading batch"
        );
        let outcomes: HashMap<ItemId, bool> = self
            .uploader
            .upload_batch(&requests)
            .await
            .into_iter()
            .map(|outcome| (outcome.id, outcome.success))
            .collect();

        for item in downloaded.iter_mut() {
            let success = outcomes.get(&item.id).copied().unwrap_or(false);
            if !success {
                warn!(item_id = %item.id, "upload failed");
                item.status = ItemStatus::Failed;
                summary.failed += 1;
                continue;
            }

            let url = self.archive_url(&item.id);
            ledger.record(item.id.clone(), item.title(), url, item.size_bytes);
            item.status = ItemStatus::Uploaded;
            summary.processed += 1;
            info!(item_id = %item.id, title = %item.title(), "uploaded");
        }
    }

    async fn persist_and_commit(&self, ledger: &Ledger) {
        if let Err(e) = self.store.persist(ledger).await {
            error!(error = %e, "failed to persist ledger, uploads of this run are not recorded");
            return;
        }

        if let Err(e) = self.committer.commit(self.store.path()).await {
            warn!(committer = self.committer.name(), error = %e, "failed to commit ledger");
        }
    }

    /// Sweep the staging directory outside a run
    ///
    /// Used after a run future was dropped mid-flight and its own cleanup
    /// never ran.
    pub async fn clear_staging(&self) {
        self.sweep("abort").await;
    }

    async fn sweep(&self, stage: &str) {
        match self.staging.sweep().await {
            Ok(0) => {}
            Ok(removed) => debug!(stage, removed, "swept staging directory"),
            Err(e) => warn!(stage, error = %e, "failed to sweep staging directory"),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
