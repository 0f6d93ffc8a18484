//! Core types for channel-archiver

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque, stable identifier of one media item
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID can be used verbatim as a staging file stem
    ///
    /// Rejects empty IDs, IDs with path separators or NUL, and IDs starting
    /// with a dot.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && !self.0.contains(&['/', '\\', '\0'][..])
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Processing state of an item within one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemStatus {
    /// Discovered, not yet fetched
    #[default]
    Pending,
    /// Staged locally, waiting for the batch upload
    Downloaded,
    /// Confirmed by the archive and recorded in the ledger
    Uploaded,
    /// Transfer or upload failed
    Failed,
}

/// One unit of work for the duration of a run
///
/// Never persisted; the ledger only ever sees a [`crate::ledger::LedgerRecord`].
#[derive(Clone, Debug)]
pub struct Item {
    /// Item identifier
    pub id: ItemId,
    /// Display title, known once resolved
    pub resolved_title: Option<String>,
    /// Staging location while the item is in flight
    pub local_path: Option<PathBuf>,
    /// Size of the staged file
    pub size_bytes: u64,
    /// Current state
    pub status: ItemStatus,
}

impl Item {
    /// A freshly discovered item
    pub fn pending(id: ItemId) -> Self {
        Self {
            id,
            resolved_title: None,
            local_path: None,
            size_bytes: 0,
            status: ItemStatus::Pending,
        }
    }

    /// Record a successful download
    pub fn mark_downloaded(&mut self, local_path: PathBuf, asset: FetchedAsset) {
        self.local_path = Some(local_path);
        self.resolved_title = Some(asset.title);
        self.size_bytes = asset.size_bytes;
        self.status = ItemStatus::Downloaded;
    }

    /// Title to use for upload and ledger, falling back to the ID
    pub fn title(&self) -> String {
        self.resolved_title
            .clone()
            .unwrap_or_else(|| fallback_title(&self.id))
    }
}

/// Title used when the resolver gives none
pub fn fallback_title(id: &ItemId) -> String {
    format!("Video {}", id)
}

/// Result of a successful transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedAsset {
    /// Display title reported by the resolver
    pub title: String,
    /// Size of the file written to the staging path
    pub size_bytes: u64,
}

/// Counters reported at the end of every run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items uploaded and recorded in the ledger during this run
    pub processed: usize,
    /// Items already present in the ledger (or repeated in the listing)
    pub skipped: usize,
    /// Items that failed to transfer or upload
    pub failed: usize,
}

impl RunSummary {
    /// Total number of listed items accounted for
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "  processed: {}", self.processed)?;
        writeln!(f, "  skipped (already processed): {}", self.skipped)?;
        write!(f, "  failed: {}", self.failed)
    }
}
