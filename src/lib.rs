//! # autoevolve
//!
//! An idempotent daily self-modification pipeline over Tokio.
//!
//! ## Architecture
//!
//! One scheduled trigger drives a single-shot, sequential run:
//! ```text
//! Trigger(23:55) → HistoryProbe → [activity?] → ContentMutator → PublishStep
//!                                     │
//!                                     └─ yes → Skipped
//! ```
//!
//! The remote repository's commit history is the idempotency oracle: a run
//! only mutates and publishes when no commit landed today, so re-running
//! after a failure is always safe. The next daily fire is the only retry
//! mechanism.

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod generator;
pub mod mutator;
pub mod orchestrator;
pub mod probe;
pub mod publisher;

// Re-exports for convenience
pub use config::{ConfigError, EvolveConfig};
pub use generator::{ChatMessage, GenerationError, HttpGenerator, Provider, Role, TextGenerator};
pub use mutator::{ArtifactMutator, ContentMutator, MutationError};
pub use orchestrator::{DailyOrchestrator, RunOutcome, SkipReason};
pub use probe::{ActivityProbe, ActivityWindow, GitHubProbe, ProbeError};
pub use publisher::{ArtifactPublisher, GitOp, GitPublisher, PublishError};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///   for local development
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`EvolveError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
pub fn init_tracing() -> Result<(), EvolveError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| EvolveError::Other(format!("tracing init failed: {e}")))
}

/// Top-level pipeline errors.
///
/// Every error surface in the daily run is mapped to a variant here. The
/// orchestrator is the only boundary that handles these; components below it
/// return their own typed errors, which convert via `From`.
#[derive(Error, Debug)]
pub enum EvolveError {
    /// A required configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The commit-history lookup failed (transport, auth, or non-2xx).
    #[error("history probe failed: {0}")]
    Probe(#[from] ProbeError),

    /// A text-generation call failed or the model is unsupported.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The artifact could not be read, the response had no usable code
    /// block, or the rewritten artifact could not be written.
    #[error("mutation failed: {0}")]
    Mutation(#[from] MutationError),

    /// A git stage/commit/push sub-operation failed.
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}
