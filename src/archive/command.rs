//! Batch uploader delegating to an external upload program
//!
//! The program is started once per batch. It receives on stdin a JSON
//! document describing the whole batch:
//!
//! ```json
//! {
//!   "identifier": "my-archive",
//!   "collection": "opensource_audio",
//!   "mediatype": "audio",
//!   "creator": "someone",
//!   "items": [
//!     { "id": "abc", "path": "temp_downloads/abc.webm", "title": "Song", "external_id": "abc" }
//!   ]
//! }
//! ```
//!
//! and must print a JSON array of `{"id", "status"}` objects on stdout.
//! Diagnostics belong on stderr, which is passed through. Credentials are
//! expected in the program's environment, never in the payload.

use super::parser::{ReportedStatus, parse_upload_output, reconcile_outcomes};
use super::traits::{BatchUploader, UploadOutcome, UploadRequest, all_failed};
use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Archive metadata attached to every file of a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveMetadata {
    /// Archive item identifier
    pub identifier: String,
    /// Collection name
    pub collection: String,
    /// Media type
    pub media_type: String,
    /// Optional creator
    pub creator: Option<String>,
}

impl From<&ArchiveConfig> for ArchiveMetadata {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            identifier: config.identifier.clone(),
            collection: config.collection.clone(),
            media_type: config.media_type.clone(),
            creator: config.creator.clone(),
        }
    }
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    identifier: &'a str,
    collection: &'a str,
    mediatype: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    creator: Option<&'a str>,
    items: Vec<PayloadItem<'a>>,
}

#[derive(Serialize)]
struct PayloadItem<'a> {
    id: &'a str,
    path: &'a std::path::Path,
    title: &'a str,
    external_id: &'a str,
}

/// Batch uploader running an external program once per batch
///
/// # Examples
///
/// ```no_run
/// use channel_archiver::archive::{ArchiveMetadata, CommandBatchUploader};
/// use std::path::PathBuf;
/// use std::time::Duration;
///
/// let uploader = CommandBatchUploader::new(
///     PathBuf::from("python3"),
///     vec!["scripts/ia_batch_upload.py".to_string()],
///     ArchiveMetadata {
///         identifier: "my-archive".into(),
///         collection: "opensource_audio".into(),
///         media_type: "audio".into(),
///         creator: None,
///     },
///     Duration::from_secs(3600),
/// );
/// ```
#[derive(Clone, Debug)]
pub struct CommandBatchUploader {
    program: PathBuf,
    args: Vec<String>,
    metadata: ArchiveMetadata,
    timeout: Duration,
}

impl CommandBatchUploader {
    /// Create an uploader with an explicit program path
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        metadata: ArchiveMetadata,
        timeout: Duration,
    ) -> Self {
        Self {
            program,
            args,
            metadata,
            timeout,
        }
    }

    /// Build from configuration, locating the program with `which`
    ///
    /// Returns `None` when the configured program cannot be found.
    pub fn from_config(config: &ArchiveConfig) -> Option<Self> {
        let program = which::which(&config.upload_program).ok()?;
        Some(Self::new(
            program,
            config.upload_args.clone(),
            ArchiveMetadata::from(config),
            config.upload_timeout,
        ))
    }

    fn payload(&self, items: &[UploadRequest]) -> Result<Vec<u8>> {
        let payload = BatchPayload {
            identifier: &self.metadata.identifier,
            collection: &self.metadata.collection,
            mediatype: &self.metadata.media_type,
            creator: self.metadata.creator.as_deref(),
            items: items
                .iter()
                .map(|item| PayloadItem {
                    id: item.id.as_str(),
                    path: &item.local_path,
                    title: &item.title,
                    external_id: item.id.as_str(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    async fn run(&self, items: &[UploadRequest]) -> Result<Vec<ReportedStatus>> {
        let payload = self.payload(items)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Upload(format!(
                    "failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Upload("upload program stdin unavailable".to_string()))?;

        let feed = async move {
            let result = stdin.write_all(&payload).await;
            drop(stdin);
            result
        };

        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| Error::Upload(format!("upload timed out after {:?}", self.timeout)))?;

        if let Err(e) = fed {
            tracing::warn!(error = %e, "upload program did not accept the whole payload");
        }
        let output = output
            .map_err(|e| Error::Upload(format!("failed to collect upload output: {}", e)))?;

        if !output.status.success() {
            tracing::warn!(status = %output.status, "upload program exited unsuccessfully");
        }

        parse_upload_output(&output.stdout)
    }
}

#[async_trait]
impl BatchUploader for CommandBatchUploader {
    async fn upload_batch(&self, items: &[UploadRequest]) -> Vec<UploadOutcome> {
        if items.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            program = ?self.program,
            identifier = %self.metadata.identifier,
            count = items.len(),
            "uploading batch"
        );

        match self.run(items).await {
            Ok(reported) => reconcile_outcomes(items, &reported),
            Err(e) => {
                tracing::error!(error = %e, count = items.len(), "batch upload failed, marking every item failed");
                all_failed(items)
            }
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
