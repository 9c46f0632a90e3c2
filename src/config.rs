//! # Environment Configuration
//!
//! ## Responsibility
//! Load every identifier and credential the pipeline needs from the process
//! environment, once, at startup. Missing required values fail fast here,
//! never later as a malformed request.
//!
//! ## NOT Responsible For
//! - Provider API keys (the generator owns those, see `generator`)
//! - `.env` loading (the binary calls `dotenvy` before this runs)
//!
//! ## Environment Variables
//!
//! - `GITHUB_USERNAME`: owner of the tracked repository (required)
//! - `REPO_NAME`: tracked repository name (required)
//! - `GITHUB_TOKEN`: bearer credential for the commits API (required)
//! - `FILE_TO_UPDATE`: artifact path, relative to the repo (required)
//! - `BRANCH`: remote branch pushed to (default: `main`)
//! - `COMMIT_MESSAGE`: fixed commit message (default provided)
//! - `EVOLVE_MODEL`: model id routed to a provider (default:
//!   `gemini-2.0-flash-lite`)
//! - `REPO_DIR`: local working copy the git commands run in (default: `.`)

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),
}

/// Everything the pipeline reads from the environment, resolved at startup.
///
/// Identity of the artifact and repository is fixed configuration; the
/// pipeline never derives it at runtime.
#[derive(Debug, Clone)]
pub struct EvolveConfig {
    /// Owner of the tracked GitHub repository.
    pub owner: String,
    /// Tracked repository name.
    pub repo: String,
    /// Bearer credential for the GitHub commits API.
    pub github_token: String,
    /// Path of the artifact, relative to the working copy root.
    pub artifact: PathBuf,
    /// Remote branch the mutation is pushed to.
    pub branch: String,
    /// Fixed commit message used for every publish.
    pub commit_message: String,
    /// Model id; the generator maps it to a provider.
    pub model: String,
    /// Local working copy the git commands run in.
    pub repo_dir: PathBuf,
}

impl EvolveConfig {
    /// Load the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] naming the first required
    /// variable that is unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            owner: required("GITHUB_USERNAME")?,
            repo: required("REPO_NAME")?,
            github_token: required("GITHUB_TOKEN")?,
            artifact: PathBuf::from(required("FILE_TO_UPDATE")?),
            branch: optional("BRANCH", "main"),
            commit_message: optional("COMMIT_MESSAGE", "chore: daily auto-evolve"),
            model: optional("EVOLVE_MODEL", "gemini-2.0-flash-lite"),
            repo_dir: PathBuf::from(optional("REPO_DIR", ".")),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn optional(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
