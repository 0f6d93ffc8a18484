//! Batched upload of staged files to the archive
//!
//! The core abstraction is the [`BatchUploader`] trait: one call per run
//! carrying every staged file, answering with exactly one
//! [`UploadOutcome`] per input item. Implementations never fail as a
//! whole; when per-item results cannot be established every item reports
//! failure.
//!
//! - [`CommandBatchUploader`]: hands the batch to an external upload
//!   program in a single invocation and parses its JSON answer
//! - [`ScriptedBatchUploader`]: in-memory fake with scripted outcomes
//!
//! ## Usage
//!
//! ```no_run
//! use channel_archiver::archive::{BatchUploader, ScriptedBatchUploader, UploadRequest};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let uploader = ScriptedBatchUploader::new().failing(["b"]);
//! let outcomes = uploader
//!     .upload_batch(&[
//!         UploadRequest::new("a", "stage/a.webm", "A"),
//!         UploadRequest::new("b", "stage/b.webm", "B"),
//!     ])
//!     .await;
//! assert_eq!(outcomes.iter().filter(|o| o.success).count(), 1);
//! # }
//! ```

mod command;
mod parser;
mod scripted;
mod traits;

pub use command::{ArchiveMetadata, CommandBatchUploader};
pub use parser::{ReportedStatus, parse_upload_output, reconcile_outcomes};
pub use scripted::ScriptedBatchUploader;
pub use traits::{BatchUploader, UploadOutcome, UploadRequest, all_failed};
