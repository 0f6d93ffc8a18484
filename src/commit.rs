//! Ledger commit collaborator
//!
//! After a run that recorded new items, the ledger file is handed to a
//! [`LedgerCommitter`] so the record of processed items travels with the
//! repository it lives in. Commit failures are reported to the caller,
//! which logs them; the persisted ledger stays authoritative either way.

use crate::config::CommitConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Publishes the persisted ledger file
#[async_trait]
pub trait LedgerCommitter: Send + Sync {
    /// Commit (and possibly publish) the file at `ledger_path`
    async fn commit(&self, ledger_path: &Path) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Committer that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpCommitter;

#[async_trait]
impl LedgerCommitter for NoOpCommitter {
    async fn commit(&self, _ledger_path: &Path) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Commits the ledger with the `git` binary
///
/// Runs inside the ledger's directory, stages only the ledger file and
/// uses the configured author identity without touching git configuration.
#[derive(Clone, Debug)]
pub struct GitCommitter {
    binary_path: PathBuf,
    message: String,
    author_name: String,
    author_email: String,
    push: bool,
}

impl GitCommitter {
    /// Create a committer with an explicit git binary
    pub fn new(binary_path: PathBuf, config: &CommitConfig) -> Self {
        Self {
            binary_path,
            message: config.message.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            push: config.push,
        }
    }

    /// Locate `git` in PATH
    ///
    /// Returns `None` if the binary cannot be found.
    pub fn from_path(config: &CommitConfig) -> Option<Self> {
        which::which("git").ok().map(|path| Self::new(path, config))
    }

    async fn git(&self, workdir: &Path, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.binary_path)
            .current_dir(workdir)
            .arg("-c")
            .arg(format!("user.name={}", self.author_name))
            .arg("-c")
            .arg(format!("user.email={}", self.author_email))
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Commit(format!("failed to execute git: {}", e)))
    }

    async fn git_checked(&self, workdir: &Path, args: &[&str]) -> Result<()> {
        let output = self.git(workdir, args).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(Error::Commit(format!(
            "git {} failed ({}): {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[async_trait]
impl LedgerCommitter for GitCommitter {
    async fn commit(&self, ledger_path: &Path) -> Result<()> {
        let workdir = match ledger_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = ledger_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::Commit(format!("invalid ledger path {}", ledger_path.display()))
            })?;

        self.git_checked(workdir, &["add", "--", file_name]).await?;

        // Exit status 0 means nothing is staged for the ledger
        let staged = self
            .git(workdir, &["diff", "--cached", "--quiet", "--", file_name])
            .await?;
        if staged.status.success() {
            tracing::info!(path = ?ledger_path, "ledger unchanged, nothing to commit");
            return Ok(());
        }

        self.git_checked(workdir, &["commit", "-m", &self.message, "--", file_name])
            .await?;
        tracing::info!(path = ?ledger_path, "committed ledger");

        if self.push {
            self.git_checked(workdir, &["push"]).await?;
            tracing::info!("pushed ledger commit");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "git"
    }
}
