//! # Publish Step
//!
//! ## Responsibility
//! Stage exactly the tracked artifact, commit with the fixed configured
//! message, and push to the fixed remote branch. Each sub-operation is a
//! distinct failure point so logs identify which one broke.
//!
//! ## NOT Responsible For
//! - Deciding whether to publish (the orchestrator owns that)
//! - Authentication: the working copy's remote is expected to carry its own
//!   credentials (configured out-of-band)

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

// ─── Error ────────────────────────────────────────────────────────────────────

/// The git sub-operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOp {
    /// `git add <artifact>`
    Add,
    /// `git commit -m <message>`
    Commit,
    /// `git push origin <branch>`
    Push,
}

impl fmt::Display for GitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitOp::Add => write!(f, "add"),
            GitOp::Commit => write!(f, "commit"),
            GitOp::Push => write!(f, "push"),
        }
    }
}

/// Errors produced while publishing the artifact.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The git binary could not be started.
    #[error("git {op} failed to start: {source}")]
    Spawn {
        /// Sub-operation that failed to start.
        op: GitOp,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A git sub-operation exited nonzero.
    #[error("git {op} failed: {stderr}")]
    Failed {
        /// Sub-operation that failed.
        op: GitOp,
        /// Captured stderr, trimmed.
        stderr: String,
    },
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Capability contract for the publish step.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Stage, commit, and push the artifact.
    async fn publish(&self) -> Result<(), PublishError>;
}

// ─── Git publisher ────────────────────────────────────────────────────────────

/// [`ArtifactPublisher`] shelling out to the git binary in a local working
/// copy.
pub struct GitPublisher {
    repo_dir: PathBuf,
    artifact: PathBuf,
    commit_message: String,
    branch: String,
}

impl GitPublisher {
    /// Create a publisher for one working copy.
    ///
    /// `artifact` is the path staged on every publish, relative to
    /// `repo_dir`; always this exact path, never a wildcard.
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        artifact: impl Into<PathBuf>,
        commit_message: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            artifact: artifact.into(),
            commit_message: commit_message.into(),
            branch: branch.into(),
        }
    }

    async fn run(&self, op: GitOp, cmd: &mut Command) -> Result<(), PublishError> {
        let output = cmd
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|source| PublishError::Spawn { op, source })?;

        if !output.status.success() {
            return Err(PublishError::Failed {
                op,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(op = %op, "git step complete");
        Ok(())
    }
}

#[async_trait]
impl ArtifactPublisher for GitPublisher {
    async fn publish(&self) -> Result<(), PublishError> {
        self.run(
            GitOp::Add,
            Command::new("git").arg("add").arg("--").arg(&self.artifact),
        )
        .await?;

        self.run(
            GitOp::Commit,
            Command::new("git")
                .arg("commit")
                .arg("-m")
                .arg(&self.commit_message),
        )
        .await?;

        self.run(
            GitOp::Push,
            Command::new("git")
                .arg("push")
                .arg("origin")
                .arg(&self.branch),
        )
        .await?;

        tracing::info!(
            artifact = %self.artifact.display(),
            branch = %self.branch,
            "publish complete"
        );
        Ok(())
    }
}
