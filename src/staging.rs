//! Staging directory for in-flight downloads
//!
//! Each item is staged at `<dir>/<id>.<extension>`, so concurrent transfers
//! of distinct items never share a file. Any regular file in the directory
//! with the staging extension is "item-shaped" and is removed by
//! [`StagingArea::sweep`].

use crate::error::{Error, Result};
use crate::types::ItemId;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Owner of the staging directory for one run
#[derive(Clone, Debug)]
pub struct StagingArea {
    dir: PathBuf,
    extension: String,
}

impl StagingArea {
    /// Staging area rooted at `dir`, staging files with `extension` (no dot)
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// Staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staging file extension
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Create the staging directory if it does not exist
    pub async fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create staging directory {}: {}", self.dir.display(), e),
            ))
        })
    }

    /// File name an item is staged and archived under
    pub fn file_name(&self, id: &ItemId) -> String {
        format!("{}.{}", id, self.extension)
    }

    /// Staging path of an item
    ///
    /// # Errors
    ///
    /// [`Error::InvalidItemId`] when the ID cannot be used as a file stem.
    pub fn item_path(&self, id: &ItemId) -> Result<PathBuf> {
        if !id.is_file_safe() {
            return Err(Error::InvalidItemId(id.to_string()));
        }
        Ok(self.dir.join(self.file_name(id)))
    }

    /// Whether `path` names an item-shaped file
    pub fn is_item_shaped(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Delete staged files, logging failures
    ///
    /// Returns the number of files actually removed.
    pub async fn remove_staged<'a, I>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut removed = 0;
        for path in paths {
            match remove_if_exists(path).await {
                Ok(true) => {
                    debug!(?path, "removed staged file");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(?path, error = %e, "failed to remove staged file"),
            }
        }
        removed
    }

    /// Remove every item-shaped file left in the staging directory
    ///
    /// A missing directory counts as clean. Individual deletion failures are
    /// logged and do not stop the sweep.
    pub async fn sweep(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut leftovers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.is_item_shaped(&path) {
                leftovers.push(path);
            }
        }

        if leftovers.is_empty() {
            return Ok(0);
        }

        info!(
            dir = ?self.dir,
            count = leftovers.len(),
            "cleaning up leftover staging files"
        );
        Ok(self.remove_staged(leftovers.iter().map(PathBuf::as_path)).await)
    }
}

/// Delete a file, treating "already gone" as success
///
/// Returns whether a file was removed.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
