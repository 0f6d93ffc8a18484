//! Error types for channel-archiver
//!
//! The taxonomy follows the life of a run:
//! - fatal errors that abort the run (listing, configuration, cancellation)
//! - per-item errors raised inside a transfer attempt, retried and then
//!   absorbed into the run summary
//! - batch- and run-scoped errors (upload, persist, commit) that are logged
//!   and never abort the process

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for channel-archiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-archiver
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// The lister could not produce any item for the channel
    #[error("listing failed for channel {channel}: {reason}")]
    Listing {
        /// Channel that was listed
        channel: String,
        /// Why the listing is unusable
        reason: String,
    },

    /// The resolver did not return a usable download URL
    #[error("could not resolve item {id}: {reason}")]
    Resolution {
        /// Item that failed to resolve
        id: String,
        /// Upstream failure description
        reason: String,
    },

    /// Download completed but produced an empty file
    #[error("downloaded file for item {id} is 0 bytes")]
    EmptyDownload {
        /// Item whose download was empty
        id: String,
    },

    /// Remote endpoint answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code returned
        status: u16,
    },

    /// Every transfer attempt for an item failed
    #[error("transfer of item {id} failed after {attempts} attempt(s): {last_cause}")]
    Transfer {
        /// Item that could not be fetched
        id: String,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        last_cause: Box<Error>,
    },

    /// Batch upload could not produce per-item results
    #[error("upload error: {0}")]
    Upload(String),

    /// Writing the ledger file failed
    #[error("failed to persist ledger to {path}: {source}")]
    Persist {
        /// Ledger file path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Committing the ledger file failed
    #[error("commit error: {0}")]
    Commit(String),

    /// Item ID cannot be used as a staging file name
    #[error("invalid item id {0:?}")]
    InvalidItemId(String),

    /// The run was interrupted before it could finish
    #[error("run cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for an error that aborts the run
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cancelled => 130,
            _ => 1,
        }
    }

    /// Whether this error ends the whole run rather than a single item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Listing { .. } | Error::Config { .. } | Error::Cancelled
        )
    }
}
