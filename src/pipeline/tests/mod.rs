use super::*;
use crate::archive::ScriptedBatchUploader;
use crate::config::RetryConfig;
use crate::resolver::HttpResolver;
use crate::retry::NoBackoff;
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StaticLister(Vec<ItemId>);

impl StaticLister {
    fn of(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self(ids.iter().map(|id| ItemId::from(*id)).collect()))
    }
}

#[async_trait]
impl ItemLister for StaticLister {
    async fn list(&self, _channel_id: &str) -> Result<Vec<ItemId>> {
        Ok(self.0.clone())
    }
}

/// Leaves an orphan in the staging directory, then fails
struct OrphanLeavingLister {
    orphan: PathBuf,
}

#[async_trait]
impl ItemLister for OrphanLeavingLister {
    async fn list(&self, channel_id: &str) -> Result<Vec<ItemId>> {
        tokio::fs::write(&self.orphan, b"orphan").await?;
        Err(Error::Listing {
            channel: channel_id.to_string(),
            reason: "service unavailable".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingCommitter {
    commits: Mutex<Vec<PathBuf>>,
}

impl RecordingCommitter {
    fn count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerCommitter for RecordingCommitter {
    async fn commit(&self, ledger_path: &Path) -> Result<()> {
        self.commits.lock().unwrap().push(ledger_path.to_path_buf());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Rejects every commit, as a refused push would
struct FailingCommitter;

#[async_trait]
impl LedgerCommitter for FailingCommitter {
    async fn commit(&self, _ledger_path: &Path) -> Result<()> {
        Err(Error::Commit("push rejected".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Never answers
struct HangingLister;

#[async_trait]
impl ItemLister for HangingLister {
    async fn list(&self, _channel_id: &str) -> Result<Vec<ItemId>> {
        std::future::pending().await
    }
}

struct Harness {
    server: MockServer,
    dir: TempDir,
    uploader: Arc<ScriptedBatchUploader>,
    committer: Arc<RecordingCommitter>,
}

impl Harness {
    async fn new(uploader: ScriptedBatchUploader) -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().unwrap(),
            uploader: Arc::new(uploader),
            committer: Arc::new(RecordingCommitter::default()),
        }
    }

    fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("temp_downloads")
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("downloads.json")
    }

    fn pipeline(&self, lister: Arc<dyn ItemLister>) -> Pipeline {
        let resolver = HttpResolver::new(
            format!("{}/mp3", self.server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        let worker = TransferWorker::new(
            Arc::new(resolver),
            reqwest::Client::new(),
            &RetryConfig::default(),
            Duration::from_secs(5),
        )
        .with_backoff(Arc::new(NoBackoff));

        Pipeline::new(
            lister,
            worker,
            self.uploader.clone(),
            LedgerStore::new(self.ledger_path()),
            StagingArea::new(self.staging_dir(), "webm"),
            "https://archive.example/serve/test/",
        )
        .with_committer(self.committer.clone())
    }

    async fn serve(&self, id: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/mp3/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": format!("{}/media/{id}", self.server.uri()),
                "filename": format!("{id} song.mp3"),
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/media/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.server)
            .await;
    }

    fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn ledger_with(ids: &[&str]) -> Ledger {
    let mut ledger = Ledger::new();
    for id in ids {
        ledger.record(ItemId::from(*id), *id, format!("https://old/{id}.webm"), 1);
    }
    ledger
}

#[tokio::test]
async fn test_new_and_known_items() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("b", b"bbbb").await;

    let report = h
        .pipeline(StaticLister::of(&["a", "b"]))
        .run_once("chan", ledger_with(&["a"]))
        .await
        .unwrap();

    assert_eq!(
        report.summary,
        RunSummary {
            processed: 1,
            skipped: 1,
            failed: 0
        }
    );
    let record = report.ledger.get(&ItemId::from("b")).unwrap();
    assert_eq!(record.title, "b song");
    assert_eq!(record.size_bytes, 4);
    assert_eq!(record.archive_url, "https://archive.example/serve/test/b.webm");
    assert_eq!(h.uploader.calls(), 1);
    assert_eq!(h.uploader.batches()[0].len(), 1);
    assert_eq!(h.committer.count(), 1);
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_everything_known_makes_no_upload_and_no_write() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;

    let report = h
        .pipeline(StaticLister::of(&["a", "b"]))
        .run_once("chan", ledger_with(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.processed, 0);
    assert_eq!(h.uploader.calls(), 0);
    assert_eq!(h.committer.count(), 0);
    assert!(!h.ledger_path().exists(), "ledger is only written when something was processed");
}

#[tokio::test]
async fn test_partial_upload_failure() {
    let h = Harness::new(ScriptedBatchUploader::new().failing(["b"])).await;
    h.serve("a", b"aaa").await;
    h.serve("b", b"bbb").await;

    let report = h
        .pipeline(StaticLister::of(&["a", "b"]))
        .run_once("chan", Ledger::new())
        .await
        .unwrap();

    assert_eq!(report.summary.processed, 1);
    assert_eq!(report.summary.failed, 1);
    assert!(report.ledger.contains(&ItemId::from("a")));
    assert!(!report.ledger.contains(&ItemId::from("b")));
    assert_eq!(h.uploader.calls(), 1, "one upload call per run");
    assert_eq!(h.staged_files(), 0, "failed uploads are cleaned up too");

    let persisted = LedgerStore::new(h.ledger_path()).load().await;
    assert!(persisted.contains(&ItemId::from("a")));
    assert!(!persisted.contains(&ItemId::from("b")));
}

#[tokio::test]
async fn test_whole_batch_failure_records_nothing() {
    let h = Harness::new(ScriptedBatchUploader::new().fail_whole_batch()).await;
    h.serve("a", b"aaa").await;
    h.serve("b", b"bbb").await;

    let report = h
        .pipeline(StaticLister::of(&["a", "b"]))
        .run_once("chan", Ledger::new())
        .await
        .unwrap();

    assert_eq!(report.summary.failed, 2);
    assert!(report.ledger.is_empty());
    assert!(!h.ledger_path().exists());
    assert_eq!(h.committer.count(), 0);
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_transfer_failure_is_counted_and_not_uploaded() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;
    // "b" resolves to an empty file on every attempt
    h.serve("b", b"").await;

    let report = h
        .pipeline(StaticLister::of(&["a", "b"]))
        .run_once("chan", Ledger::new())
        .await
        .unwrap();

    assert_eq!(
        report.summary,
        RunSummary {
            processed: 1,
            skipped: 0,
            failed: 1
        }
    );
    let batch = &h.uploader.batches()[0];
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id.as_str(), "a");
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_upload_requests_point_at_staged_files() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;

    h.pipeline(StaticLister::of(&["a"]))
        .run_once("chan", Ledger::new())
        .await
        .unwrap();

    let batch = &h.uploader.batches()[0];
    assert_eq!(batch[0].local_path, h.staging_dir().join("a.webm"));
    assert_eq!(batch[0].title, "a song");
}

#[tokio::test]
async fn test_duplicate_listing_entries_are_processed_once() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;

    let report = h
        .pipeline(StaticLister::of(&["a", "a", "a"]))
        .run_once("chan", Ledger::new())
        .await
        .unwrap();

    assert_eq!(report.summary.processed, 1);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(h.uploader.batches()[0].len(), 1);
}

#[tokio::test]
async fn test_unsafe_ids_fail_without_fetching() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;

    let report = h
        .pipeline(StaticLister::of(&["a", "../escape", ".hidden"]))
        .run_once("chan", Ledger::new())
        .await
        .unwrap();

    assert_eq!(report.summary.processed, 1);
    assert_eq!(report.summary.failed, 2);
    assert!(!h.dir.path().join("escape.webm").exists());
}

#[tokio::test]
async fn test_empty_listing_is_fatal() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;

    let result = h
        .pipeline(StaticLister::of(&[]))
        .run_once("chan", Ledger::new())
        .await;

    assert!(matches!(result, Err(Error::Listing { .. })));
    assert_eq!(h.uploader.calls(), 0);
    assert!(!h.ledger_path().exists());
}

#[tokio::test]
async fn test_failed_listing_still_sweeps() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    let orphan = h.staging_dir().join("orphan.webm");
    let lister = Arc::new(OrphanLeavingLister {
        orphan: orphan.clone(),
    });

    let result = h.pipeline(lister).run_once("chan", Ledger::new()).await;

    assert!(matches!(result, Err(Error::Listing { .. })));
    assert!(!orphan.exists());
}

#[tokio::test]
async fn test_startup_sweep_removes_leftovers() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    std::fs::create_dir_all(h.staging_dir()).unwrap();
    std::fs::write(h.staging_dir().join("stale.webm"), b"old").unwrap();
    std::fs::write(h.staging_dir().join("README"), b"keep").unwrap();

    h.pipeline(StaticLister::of(&["a"]))
        .run_once("chan", ledger_with(&["a"]))
        .await
        .unwrap();

    assert!(!h.staging_dir().join("stale.webm").exists());
    assert!(h.staging_dir().join("README").exists());
}

#[tokio::test]
async fn test_persist_failure_keeps_summary() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;

    // Parent of the ledger path is a regular file, so persisting fails
    let blocker = h.dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let resolver = HttpResolver::new(format!("{}/mp3", h.server.uri()), Duration::from_secs(5))
        .unwrap();
    let worker = TransferWorker::new(
        Arc::new(resolver),
        reqwest::Client::new(),
        &RetryConfig::default(),
        Duration::from_secs(5),
    )
    .with_backoff(Arc::new(NoBackoff));
    let pipeline = Pipeline::new(
        StaticLister::of(&["a"]),
        worker,
        h.uploader.clone(),
        LedgerStore::new(blocker.join("downloads.json")),
        StagingArea::new(h.staging_dir(), "webm"),
        "https://archive.example",
    )
    .with_committer(h.committer.clone());

    let report = pipeline.run_once("chan", Ledger::new()).await.unwrap();

    assert_eq!(report.summary.processed, 1);
    assert_eq!(h.committer.count(), 0, "nothing to commit without a persisted ledger");
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_commit_failure_is_not_fatal() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;
    let pipeline = h
        .pipeline(StaticLister::of(&["a"]))
        .with_committer(Arc::new(FailingCommitter));

    let report = pipeline.run_once("chan", Ledger::new()).await.unwrap();

    assert_eq!(report.summary.processed, 1);
    assert!(h.ledger_path().exists(), "ledger persisted before the commit");
    assert!(pipeline.store().load().await.contains(&ItemId::from("a")));
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_cancel_during_listing_stops_the_run() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    std::fs::create_dir_all(h.staging_dir()).unwrap();
    std::fs::write(h.staging_dir().join("orphan.webm"), b"x").unwrap();

    let pipeline = h.pipeline(Arc::new(HangingLister));
    let token = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.run_once("chan", Ledger::new()),
    )
    .await
    .expect("listing ignored the cancellation");

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(h.uploader.calls(), 0);
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_cancelled_run_skips_upload_and_cleans_up() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    Mock::given(method("GET"))
        .and(path("/mp3/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/media/slow", h.server.uri()),
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;

    let pipeline = h.pipeline(StaticLister::of(&["slow"]));
    let token = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let result = pipeline.run_once("chan", Ledger::new()).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(h.uploader.calls(), 0);
    assert!(!h.ledger_path().exists());
    assert_eq!(h.staged_files(), 0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = Harness::new(ScriptedBatchUploader::new()).await;
    h.serve("a", b"aaa").await;
    h.serve("b", b"bbb").await;
    let pipeline = h.pipeline(StaticLister::of(&["a", "b"]));

    let first = pipeline.run_once("chan", Ledger::new()).await.unwrap();
    let second = pipeline
        .run_once("chan", pipeline.store().load().await)
        .await
        .unwrap();

    assert_eq!(first.summary.processed, 2);
    assert_eq!(
        second.summary,
        RunSummary {
            processed: 0,
            skipped: 2,
            failed: 0
        }
    );
    assert_eq!(h.uploader.calls(), 1);
    assert_eq!(h.committer.count(), 1);
}

#[test]
fn test_archive_url_uses_staged_file_name() {
    let dir = TempDir::new().unwrap();
    let resolver = HttpResolver::new("http://127.0.0.1:1/mp3", Duration::from_secs(1)).unwrap();
    let worker = TransferWorker::new(
        Arc::new(resolver),
        reqwest::Client::new(),
        &RetryConfig::default(),
        Duration::from_secs(1),
    );
    let pipeline = Pipeline::new(
        StaticLister::of(&[]),
        worker,
        Arc::new(ScriptedBatchUploader::new()),
        LedgerStore::new(dir.path().join("downloads.json")),
        StagingArea::new(dir.path(), "webm"),
        "https://archive.org/serve/my-archive/",
    );

    assert_eq!(
        pipeline.archive_url(&ItemId::from("abc")),
        "https://archive.org/serve/my-archive/abc.webm"
    );
}
