//! Utility functions shared by the HTTP clients

use crate::error::{Error, Result};
use std::time::Duration;

/// Build an HTTP client with a request timeout
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("channel-archiver/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {}", e),
            key: None,
        })
}

/// Append one percent-encoded path segment to a base URL
///
/// # Examples
///
/// ```
/// use channel_archiver::utils::endpoint_url;
///
/// assert_eq!(
///     endpoint_url("https://api.example/mp3/", "a b"),
///     "https://api.example/mp3/a%20b"
/// );
/// ```
pub fn endpoint_url(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(segment)
    )
}

/// Format a byte count as mebibytes with two decimals
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1_048_576.0)
}
