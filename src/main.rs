//! channel-archiver binary: one ingestion run per invocation.

use channel_archiver::{
    CommandBatchUploader, Config, Error, GitCommitter, HttpLister, HttpResolver, LedgerCommitter,
    LedgerStore, NoOpCommitter, Pipeline, Result, StagingArea, TransferWorker, run_with_shutdown,
    utils::http_client,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "channel-archiver.toml";

/// Archive every new item of a channel and record it in the ledger
#[derive(Parser, Debug)]
#[command(name = "channel-archiver")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ./channel-archiver.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel to ingest, overriding `channel_id` from the configuration
    #[arg(long)]
    channel: Option<String>,

    /// Ledger file, overriding `ledger.path`
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Staging directory, overriding `transfer.staging_dir`
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Attempts per item, overriding `retry.max_attempts`
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Concurrent transfers, overriding `transfer.max_concurrent`
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Do not commit the ledger after the run
    #[arg(long)]
    no_commit: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) if e.is_fatal() => {
            tracing::error!(error = %e, "run aborted");
            eprintln!("error: {e}");
            e.exit_code()
        }
        // Anything else escaping a run is an environment failure
        Err(e) => {
            tracing::error!(error = ?e, "run failed unexpectedly");
            eprintln!("error: {e}");
            e.exit_code()
        }
    };

    if exit_code != 0 {
        process::exit(exit_code);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let channel_id = config.channel_id.clone().ok_or_else(|| Error::Config {
        message: "no channel given (use --channel or set channel_id)".to_string(),
        key: Some("channel_id".to_string()),
    })?;

    let pipeline = build_pipeline(&config)?;
    let ledger = pipeline.store().load().await;
    tracing::info!(
        channel = %channel_id,
        ledger = ?pipeline.store().path(),
        known = ledger.len(),
        "starting run"
    );

    let report = run_with_shutdown(&pipeline, &channel_id, ledger).await?;
    println!("{}", report.summary);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            Config::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => Config::default(),
    };

    if let Some(channel) = &cli.channel {
        config.channel_id = Some(channel.clone());
    }
    if let Some(ledger) = &cli.ledger {
        config.ledger.path = ledger.clone();
    }
    if let Some(dir) = &cli.staging_dir {
        config.transfer.staging_dir = dir.clone();
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.retry.max_attempts = max_attempts;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.transfer.max_concurrent = max_concurrent;
    }
    if cli.no_commit {
        config.commit.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let client = http_client(config.services.request_timeout)?;
    let lister = HttpLister::with_client(client.clone(), config.services.lister_url.clone());
    let resolver = HttpResolver::with_client(client.clone(), config.services.resolver_url.clone());
    let worker = TransferWorker::new(
        Arc::new(resolver),
        client,
        &config.retry,
        config.transfer.download_timeout,
    );

    let uploader = CommandBatchUploader::from_config(&config.archive).ok_or_else(|| {
        Error::Config {
            message: format!(
                "upload program {} not found",
                config.archive.upload_program.display()
            ),
            key: Some("archive.upload_program".to_string()),
        }
    })?;

    let committer: Arc<dyn LedgerCommitter> = if config.commit.enabled {
        match GitCommitter::from_path(&config.commit) {
            Some(git) => Arc::new(git),
            None => {
                tracing::warn!("git not found in PATH, the ledger will not be committed");
                Arc::new(NoOpCommitter)
            }
        }
    } else {
        Arc::new(NoOpCommitter)
    };

    Ok(Pipeline::new(
        Arc::new(lister),
        worker,
        Arc::new(uploader),
        LedgerStore::new(&config.ledger.path),
        StagingArea::new(
            &config.transfer.staging_dir,
            config.transfer.file_extension.clone(),
        ),
        config.archive.serve_base_url(),
    )
    .with_committer(committer)
    .with_max_concurrent(config.transfer.max_concurrent))
}
