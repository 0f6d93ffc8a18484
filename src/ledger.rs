//! Persistent ledger of processed items
//!
//! The ledger is a JSON object keyed by item ID:
//!
//! ```json
//! {
//!   "dQw4w9WgXcQ": {
//!     "title": "Some title",
//!     "id": "dQw4w9WgXcQ",
//!     "filePath": "https://archive.org/serve/identifier/dQw4w9WgXcQ.webm",
//!     "size": 3456789,
//!     "uploadDate": "2024-05-01T12:00:00.000Z"
//!   }
//! }
//! ```
//!
//! An ID with a valid record is never processed again. Entries that fail
//! schema validation are quarantined: kept verbatim and written back on
//! persist, but not treated as processed.

use crate::error::{Error, Result};
use crate::types::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Durable result for one uploaded item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Display title
    pub title: String,
    /// Item identifier, equal to the ledger key
    pub id: ItemId,
    /// Public archive URL of the uploaded file
    #[serde(rename = "filePath")]
    pub archive_url: String,
    /// Size in bytes of the uploaded file
    #[serde(rename = "size")]
    pub size_bytes: u64,
    /// When the upload was confirmed
    #[serde(rename = "uploadDate", with = "iso8601_millis")]
    pub upload_timestamp: DateTime<Utc>,
}

/// Problem found while loading the ledger file
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerWarning {
    /// The file exists but could not be read
    Unreadable {
        /// Underlying error
        reason: String,
    },
    /// The file is not a JSON object; the run starts from an empty ledger
    Malformed {
        /// Parse error
        reason: String,
    },
    /// One entry failed validation and was set aside
    Quarantined {
        /// Ledger key of the entry
        key: String,
        /// Validation error
        reason: String,
    },
}

impl std::fmt::Display for LedgerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerWarning::Unreadable { reason } => write!(f, "ledger unreadable: {}", reason),
            LedgerWarning::Malformed { reason } => {
                write!(f, "ledger malformed, starting empty: {}", reason)
            }
            LedgerWarning::Quarantined { key, reason } => {
                write!(f, "ledger entry {:?} quarantined: {}", key, reason)
            }
        }
    }
}

/// In-memory view of the ledger
///
/// Owned by the pipeline for the duration of a run and handed back to the
/// caller afterwards; there is no shared global instance.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    records: BTreeMap<ItemId, LedgerRecord>,
    quarantined: BTreeMap<String, Value>,
}

impl Ledger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` has a valid record and must be skipped
    pub fn contains(&self, id: &ItemId) -> bool {
        self.records.contains_key(id)
    }

    /// Record for `id`, if any
    pub fn get(&self, id: &ItemId) -> Option<&LedgerRecord> {
        self.records.get(id)
    }

    /// Add a record for a confirmed upload
    ///
    /// Stamps the current time. Returns `false` and leaves the ledger
    /// untouched when `id` already has a record. A quarantined entry under
    /// the same key is replaced.
    pub fn record(
        &mut self,
        id: ItemId,
        title: impl Into<String>,
        archive_url: impl Into<String>,
        size_bytes: u64,
    ) -> bool {
        if self.records.contains_key(&id) {
            return false;
        }
        self.quarantined.remove(id.as_str());
        let record = LedgerRecord {
            title: title.into(),
            id: id.clone(),
            archive_url: archive_url.into(),
            size_bytes,
            upload_timestamp: Utc::now(),
        };
        self.records.insert(id, record);
        true
    }

    /// Number of valid records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no valid records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of quarantined entries carried along
    pub fn quarantined_len(&self) -> usize {
        self.quarantined.len()
    }

    /// Iterate over valid records in key order
    pub fn records(&self) -> impl Iterator<Item = &LedgerRecord> {
        self.records.values()
    }

    /// Build a ledger from parsed JSON, validating every entry
    pub fn from_json(value: Value) -> (Self, Vec<LedgerWarning>) {
        let mut ledger = Ledger::new();
        let mut warnings = Vec::new();

        let Value::Object(entries) = value else {
            warnings.push(LedgerWarning::Malformed {
                reason: "top-level value is not an object".to_string(),
            });
            return (ledger, warnings);
        };

        for (key, entry) in entries {
            match serde_json::from_value::<LedgerRecord>(entry.clone()) {
                Ok(record) if record.id.as_str() == key => {
                    ledger.records.insert(record.id.clone(), record);
                }
                Ok(record) => {
                    warnings.push(LedgerWarning::Quarantined {
                        key: key.clone(),
                        reason: format!("record id {:?} does not match its key", record.id.as_str()),
                    });
                    ledger.quarantined.insert(key, entry);
                }
                Err(e) => {
                    warnings.push(LedgerWarning::Quarantined {
                        key: key.clone(),
                        reason: e.to_string(),
                    });
                    ledger.quarantined.insert(key, entry);
                }
            }
        }

        (ledger, warnings)
    }

    /// Serialize the full ledger, quarantined entries included
    pub fn to_json(&self) -> Result<Value> {
        let mut map = Map::new();
        for (key, entry) in &self.quarantined {
            map.insert(key.clone(), entry.clone());
        }
        for (id, record) in &self.records {
            map.insert(id.to_string(), serde_json::to_value(record)?);
        }
        Ok(Value::Object(map))
    }
}

/// Loads and atomically rewrites the ledger file
#[derive(Clone, Debug)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger, logging every warning
    ///
    /// Never fails: a missing file gives an empty ledger, and unreadable or
    /// malformed data gives an empty ledger plus a warning.
    pub async fn load(&self) -> Ledger {
        let (ledger, warnings) = self.load_with_warnings().await;
        for warning in &warnings {
            tracing::warn!(path = ?self.path, "{}", warning);
        }
        tracing::info!(
            path = ?self.path,
            records = ledger.len(),
            quarantined = ledger.quarantined_len(),
            "loaded ledger"
        );
        ledger
    }

    /// Load the ledger and return the warnings instead of logging them
    pub async fn load_with_warnings(&self) -> (Ledger, Vec<LedgerWarning>) {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "no ledger file yet, starting empty");
                return (Ledger::new(), Vec::new());
            }
            Err(e) => {
                return (
                    Ledger::new(),
                    vec![LedgerWarning::Unreadable {
                        reason: e.to_string(),
                    }],
                );
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ledger::from_json(value),
            Err(e) => (
                Ledger::new(),
                vec![LedgerWarning::Malformed {
                    reason: e.to_string(),
                }],
            ),
        }
    }

    /// Overwrite the ledger file with the full in-memory view
    ///
    /// Writes a sibling temporary file, syncs it and renames it over the
    /// ledger, so readers see either the old or the new file.
    pub async fn persist(&self, ledger: &Ledger) -> Result<()> {
        let mut body = serde_json::to_string_pretty(&ledger.to_json()?)?;
        body.push('\n');

        let temp_path = self.temp_path();
        let result = write_then_rename(&temp_path, &self.path, body.as_bytes()).await;
        if let Err(source) = result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::Persist {
                path: self.path.clone(),
                source,
            });
        }

        tracing::info!(path = ?self.path, records = ledger.len(), "persisted ledger");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".to_string());
        self.path
            .with_file_name(format!(".{}.tmp.{}", name, std::process::id()))
    }
}

async fn write_then_rename(temp_path: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    {
        let mut file = tokio::fs::File::create(temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(temp_path, path).await
}

// ISO-8601 with millisecond precision and a `Z` suffix
mod iso8601_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
