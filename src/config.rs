//! Configuration types for channel-archiver

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Remote service endpoints (lister and resolver)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the "list items for channel" service; the channel ID is appended as a path segment
    #[serde(default = "default_lister_url")]
    pub lister_url: String,

    /// Base URL of the "resolve download URL for item" service; the item ID is appended as a path segment
    #[serde(default = "default_resolver_url")]
    pub resolver_url: String,

    /// Timeout for lister and resolver requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            lister_url: default_lister_url(),
            resolver_url: default_resolver_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Download behavior (staging directory, timeouts, concurrency)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Staging directory for in-flight downloads (default: "temp_downloads")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Extension of staged files, without the dot (default: "webm")
    ///
    /// Every regular file in the staging directory with this extension is
    /// considered item-shaped and removed by the cleanup sweep.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Bound on a single download request, body included (default: 60 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Maximum concurrent transfers (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            file_extension: default_file_extension(),
            download_timeout: default_download_timeout(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Retry behavior for per-item transfers
///
/// The defaults give a fixed 2 second pause between attempts: a multiplier
/// of 1.0 keeps every delay at `initial_delay`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts per item, first attempt included (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failed attempt (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Archive (upload target) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive item identifier every file is uploaded into
    #[serde(default = "default_identifier")]
    pub identifier: String,

    /// Public base URL of uploaded files (default: "https://archive.org/serve/<identifier>")
    #[serde(default)]
    pub base_url: Option<String>,

    /// Collection metadata sent with the batch (default: "opensource_audio")
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Media type metadata sent with the batch (default: "audio")
    #[serde(default = "default_media_type")]
    pub media_type: String,

    /// Creator metadata sent with the batch
    #[serde(default)]
    pub creator: Option<String>,

    /// Program invoked once per batch (default: "python3")
    #[serde(default = "default_upload_program")]
    pub upload_program: PathBuf,

    /// Arguments passed to the upload program (default: ["scripts/ia_batch_upload.py"])
    #[serde(default = "default_upload_args")]
    pub upload_args: Vec<String>,

    /// Bound on the whole batch upload (default: 3600 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload_timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
            base_url: None,
            collection: default_collection(),
            media_type: default_media_type(),
            creator: None,
            upload_program: default_upload_program(),
            upload_args: default_upload_args(),
            upload_timeout: default_upload_timeout(),
        }
    }
}

impl ArchiveConfig {
    /// Base URL under which uploaded files are served, without trailing slash
    pub fn serve_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://archive.org/serve/{}", self.identifier),
        }
    }
}

/// Ledger file location
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the JSON ledger (default: "downloads.json")
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Ledger commit collaborator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Commit the ledger after a run that recorded new items (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Commit message
    #[serde(default = "default_commit_message")]
    pub message: String,

    /// Author name used for the commit
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Author email used for the commit
    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Push after committing (default: true)
    #[serde(default = "default_true")]
    pub push: bool,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message: default_commit_message(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            push: true,
        }
    }
}

/// Main configuration for a pipeline run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Channel to ingest when none is given on the command line
    #[serde(default)]
    pub channel_id: Option<String>,

    /// Lister and resolver endpoints
    #[serde(default)]
    pub services: ServiceConfig,

    /// Staging and download settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Per-item retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upload target
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Ledger file
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Ledger commit collaborator
    #[serde(default)]
    pub commit: CommitConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config {
            message: format!("invalid configuration: {}", e),
            key: None,
        })
    }

    /// Check values that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(config_error("max_attempts must be at least 1", "retry.max_attempts"));
        }
        if self.transfer.max_concurrent == 0 {
            return Err(config_error(
                "max_concurrent must be at least 1",
                "transfer.max_concurrent",
            ));
        }
        if self.transfer.file_extension.is_empty() || self.transfer.file_extension.contains('.') {
            return Err(config_error(
                "file_extension must be a bare extension such as \"webm\"",
                "transfer.file_extension",
            ));
        }
        if self.archive.identifier.trim().is_empty() {
            return Err(config_error("identifier must not be empty", "archive.identifier"));
        }
        for (key, value) in [
            ("services.lister_url", &self.services.lister_url),
            ("services.resolver_url", &self.services.resolver_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| config_error(&format!("invalid URL {:?}: {}", value, e), key))?;
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_lister_url() -> String {
    "https://backendmix-emergeny.vercel.app/list".to_string()
}

fn default_resolver_url() -> String {
    "https://backendmix.vercel.app/mp3".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("temp_downloads")
}

fn default_file_extension() -> String {
    "webm".to_string()
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_identifier() -> String {
    "channel-archive".to_string()
}

fn default_collection() -> String {
    "opensource_audio".to_string()
}

fn default_media_type() -> String {
    "audio".to_string()
}

fn default_upload_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_upload_args() -> Vec<String> {
    vec!["scripts/ia_batch_upload.py".to_string()]
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("downloads.json")
}

fn default_commit_message() -> String {
    "Update downloads.json with newly processed videos".to_string()
}

fn default_author_name() -> String {
    "github-actions".to_string()
}

fn default_author_email() -> String {
    "github-actions@github.com".to_string()
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
