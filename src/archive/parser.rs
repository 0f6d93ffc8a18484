//! Parser for upload program output

use super::traits::{UploadOutcome, UploadRequest};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::str;

/// Per-item status line reported by the upload program
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReportedStatus {
    /// Item identifier
    pub id: String,
    /// HTTP-style status of the item's upload
    pub status: u16,
}

impl ReportedStatus {
    /// 2xx counts as success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parse the upload program's stdout
///
/// The whole output must be one JSON array of `{"id", "status"}` objects.
/// Anything else is rejected: per-item status is never guessed from
/// free-form text.
pub fn parse_upload_output(stdout: &[u8]) -> Result<Vec<ReportedStatus>> {
    let text = str::from_utf8(stdout)
        .map_err(|e| Error::Upload(format!("upload output is not UTF-8: {}", e)))?
        .trim();

    if text.is_empty() {
        return Err(Error::Upload("upload program produced no output".to_string()));
    }

    serde_json::from_str(text)
        .map_err(|e| Error::Upload(format!("unparseable upload output: {}", e)))
}

/// Map reported statuses onto the requested items
///
/// Every requested item gets exactly one outcome, in request order. Items
/// missing from the report fail; unknown IDs in the report are ignored; an
/// item reported several times succeeds only if every report is a success.
pub fn reconcile_outcomes(
    items: &[UploadRequest],
    reported: &[ReportedStatus],
) -> Vec<UploadOutcome> {
    let mut by_id: HashMap<&str, bool> = HashMap::new();
    for status in reported {
        by_id
            .entry(status.id.as_str())
            .and_modify(|ok| *ok &= status.is_success())
            .or_insert(status.is_success());
    }

    for status in reported {
        if !items.iter().any(|item| item.id.as_str() == status.id) {
            tracing::debug!(item_id = %status.id, "ignoring status for unrequested item");
        }
    }

    items
        .iter()
        .map(|item| {
            let success = match by_id.get(item.id.as_str()) {
                Some(ok) => *ok,
                None => {
                    tracing::warn!(item_id = %item.id, "no upload status reported for item");
                    false
                }
            };
            UploadOutcome {
                id: item.id.clone(),
                success,
            }
        })
        .collect()
}
