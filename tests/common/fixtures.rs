//! Mock channel services and pipeline construction

use channel_archiver::retry::NoBackoff;
use channel_archiver::{
    BatchUploader, Config, HttpLister, HttpResolver, LedgerCommitter, LedgerStore, NoOpCommitter,
    Pipeline, StagingArea, TransferWorker, utils::http_client,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Channel used by every test
pub const CHANNEL: &str = "UCtestchannel";

/// Archive base URL used by every test
pub const ARCHIVE_BASE: &str = "https://archive.example/serve/test-archive";

/// Lister, resolver and media endpoints on one mock server
pub struct MockChannel {
    pub server: MockServer,
}

impl MockChannel {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn lister_url(&self) -> String {
        format!("{}/list", self.server.uri())
    }

    pub fn resolver_url(&self) -> String {
        format!("{}/mp3", self.server.uri())
    }

    /// Answer the channel listing with `ids`
    pub async fn list(&self, ids: &[&str]) {
        Mock::given(method("GET"))
            .and(path(format!("/list/{CHANNEL}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "videos": ids })))
            .mount(&self.server)
            .await;
    }

    /// Make the channel listing fail with `status`
    pub async fn list_fails(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/list/{CHANNEL}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Resolve `id` to a media endpoint serving `body` under `filename`
    pub async fn serve(&self, id: &str, filename: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/mp3/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": format!("{}/media/{id}", self.server.uri()),
                "filename": filename,
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/media/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Make every resolution of `id` fail, expecting exactly `attempts` calls
    pub async fn unresolvable(&self, id: &str, attempts: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/mp3/{id}")))
            .respond_with(ResponseTemplate::new(500))
            .expect(attempts)
            .mount(&self.server)
            .await;
    }
}

/// Temporary working directory holding the ledger and staging area
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("downloads.json")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("temp_downloads")
    }

    /// Configuration pointing at `channel` and this workspace
    pub fn config(&self, channel: &MockChannel) -> Config {
        let mut config = Config::default();
        config.channel_id = Some(CHANNEL.to_string());
        config.services.lister_url = channel.lister_url();
        config.services.resolver_url = channel.resolver_url();
        config.services.request_timeout = Duration::from_secs(5);
        config.transfer.staging_dir = self.staging_dir();
        config.transfer.download_timeout = Duration::from_secs(5);
        config.ledger.path = self.ledger_path();
        config.archive.base_url = Some(ARCHIVE_BASE.to_string());
        config.commit.enabled = false;
        config
    }
}

/// Build a pipeline from `config` with zero-delay retries
pub fn build_pipeline(
    config: &Config,
    uploader: Arc<dyn BatchUploader>,
    committer: Option<Arc<dyn LedgerCommitter>>,
) -> Pipeline {
    config.validate().unwrap();
    let client = http_client(config.services.request_timeout).unwrap();
    let lister = HttpLister::with_client(client.clone(), config.services.lister_url.clone());
    let resolver = HttpResolver::with_client(client.clone(), config.services.resolver_url.clone());
    let worker = TransferWorker::new(
        Arc::new(resolver),
        client,
        &config.retry,
        config.transfer.download_timeout,
    )
    .with_backoff(Arc::new(NoBackoff));

    Pipeline::new(
        Arc::new(lister),
        worker,
        uploader,
        LedgerStore::new(&config.ledger.path),
        StagingArea::new(
            &config.transfer.staging_dir,
            config.transfer.file_extension.clone(),
        ),
        config.archive.serve_base_url(),
    )
    .with_committer(committer.unwrap_or_else(|| Arc::new(NoOpCommitter)))
    .with_max_concurrent(config.transfer.max_concurrent)
}
