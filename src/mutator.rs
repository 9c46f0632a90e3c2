//! # Artifact Mutation
//!
//! ## Responsibility
//! Read the artifact, ask the generator to transform it under one randomly
//! selected directive, and write the result back atomically.
//!
//! ## Guarantees
//! - Fault isolation: if generation or fence extraction fails, the artifact
//!   on disk is untouched. The write is write-then-rename, so a kill
//!   mid-write can never leave a truncated artifact either.
//! - Fence extraction is pattern-anchored, never a fixed-offset slice: a
//!   response with no complete fenced block fails explicitly.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::generator::{ChatMessage, GenerationError, TextGenerator};

/// The fixed directive set one entry is drawn from each run.
///
/// Uniform random selection, no persisted state, repeats across runs are
/// expected.
pub const DIRECTIVES: [&str; 10] = [
    "Improve this code",
    "Add meaningful comments",
    "Add one more function",
    "Refactor this to be more efficient",
    "Add JSDoc-style comments",
    "Introduce error handling",
    "Convert it to TypeScript",
    "Use ES6+ features",
    "Make it object-oriented",
    "Add a test case",
];

const SYSTEM_INSTRUCTION: &str = "You are a helpful AI that edits JavaScript files. \
    Only respond with the modified code without any explanations, fenced in a \
    ``` code block.";

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors produced while mutating the artifact.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The artifact could not be read.
    #[error("failed to read artifact {}: {source}", .path.display())]
    Read {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The generation call failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The response carried no complete ``` … ``` block.
    #[error("model response contained no complete fenced code block")]
    MissingFence,

    /// The fenced block was present but empty.
    #[error("model response fenced an empty code block")]
    EmptyCodeBlock,

    /// The rewritten artifact could not be written.
    #[error("failed to write artifact {}: {source}", .path.display())]
    Write {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Capability contract for the mutation step.
#[async_trait]
pub trait ArtifactMutator: Send + Sync {
    /// Transform the artifact in place.
    async fn mutate(&self) -> Result<(), MutationError>;
}

// ─── Fence extraction ─────────────────────────────────────────────────────────

/// Extract the body of the first fenced code block in `response`.
///
/// Anchored on the opening fence line (language tag tolerated) and the last
/// closing fence after it, never a fixed-offset slice, so a provider that
/// varies the fence cannot silently corrupt the artifact.
pub(crate) fn extract_fenced(response: &str) -> Result<&str, MutationError> {
    let open = response.find("```").ok_or(MutationError::MissingFence)?;
    let after_open = &response[open + 3..];

    // The rest of the opening fence line is a language tag; the body starts
    // on the next line.
    let body_start = after_open
        .find('\n')
        .map(|i| i + 1)
        .ok_or(MutationError::MissingFence)?;
    let body = &after_open[body_start..];

    let close = body.rfind("```").ok_or(MutationError::MissingFence)?;
    let inner = &body[..close];

    if inner.trim().is_empty() {
        return Err(MutationError::EmptyCodeBlock);
    }
    Ok(inner)
}

/// Pick one directive uniformly at random.
pub fn pick_directive() -> &'static str {
    DIRECTIVES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DIRECTIVES[0])
}

// ─── Content mutator ──────────────────────────────────────────────────────────

/// [`ArtifactMutator`] that rewrites one file through a [`TextGenerator`].
pub struct ContentMutator {
    generator: std::sync::Arc<dyn TextGenerator>,
    model: String,
    artifact: PathBuf,
}

impl ContentMutator {
    /// Create a mutator for one artifact.
    pub fn new(
        generator: std::sync::Arc<dyn TextGenerator>,
        model: impl Into<String>,
        artifact: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            artifact: artifact.into(),
        }
    }

    fn read_artifact(&self) -> Result<String, MutationError> {
        std::fs::read_to_string(&self.artifact).map_err(|source| MutationError::Read {
            path: self.artifact.clone(),
            source,
        })
    }

    /// Replace the artifact via write-then-rename so a mid-write kill never
    /// leaves a truncated file.
    fn write_atomic(&self, contents: &str) -> Result<(), MutationError> {
        use std::io::Write;

        let write_err = |source: std::io::Error| MutationError::Write {
            path: self.artifact.clone(),
            source,
        };

        let parent = self.artifact.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        tmp.persist(&self.artifact)
            .map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactMutator for ContentMutator {
    async fn mutate(&self) -> Result<(), MutationError> {
        let original = self.read_artifact()?;
        let directive = pick_directive();

        tracing::info!(directive, artifact = %self.artifact.display(), "mutating artifact");

        let messages = [
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(format!("{directive}:\n\n{original}")),
        ];
        let response = self.generator.generate(&self.model, &messages).await?;
        let code = extract_fenced(&response)?;

        self.write_atomic(code)?;

        tracing::info!(
            artifact = %self.artifact.display(),
            bytes = code.len(),
            "artifact rewritten"
        );
        Ok(())
    }
}
