//! # Provider-Agnostic Text Generation
//!
//! ## Responsibility
//! Send a chat-style message sequence to one of a closed set of generation
//! providers and return normalized plain text. Provider envelope fields
//! never leak past this module.
//!
//! ## Guarantees
//! - Closed dispatch: a static model→provider table selects the adapter;
//!   unknown models fail, they are never guessed at.
//! - Bounded: every HTTP call carries an explicit timeout.
//! - No retries: a single failed call fails the whole run.
//!
//! ## NOT Responsible For
//! - Prompt construction (see `mutator`)
//! - Retry policy (the next daily trigger is the only retry)
//!
//! ## Environment Variables
//!
//! - `GEMINI_API_KEY`: required for the Gemini provider
//! - `TOGETHER_API_KEY`: required for the Together provider
//! - `OPENROUTER_API_KEY`: required for the OpenRouter provider
//!
//! Credentials are captured once at construction; only the credential of
//! the provider actually dispatched to is required.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Messages ─────────────────────────────────────────────────────────────────

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Out-of-band behavioural instruction.
    System,
    /// Caller-authored turn.
    User,
    /// Model-authored turn.
    Model,
}

/// One message in a provider-agnostic chat sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of this message.
    pub role: Role,
    /// Plain-text content.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// ─── Providers ────────────────────────────────────────────────────────────────

/// The closed set of supported generation providers.
///
/// Adding a provider means adding a variant here, a row in
/// [`Provider::for_model`], and one request/response adapter; the
/// [`TextGenerator::generate`] contract never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Google Gemini (single-turn, system-instruction-separated).
    Gemini,
    /// Together AI (OpenAI-chat-compatible).
    Together,
    /// OpenRouter (OpenAI-chat-compatible).
    OpenRouter,
}

impl Provider {
    /// Static model→provider table.
    ///
    /// Returns `None` for model ids outside the supported set.
    pub fn for_model(model: &str) -> Option<Provider> {
        match model {
            "gemini-2.0-flash-lite" => Some(Provider::Gemini),
            "meta-llama/Llama-4-Maverick-17B-128E-Instruct-FP8" => Some(Provider::Together),
            "microsoft/mai-ds-r1:free" => Some(Provider::OpenRouter),
            _ => None,
        }
    }

    /// Name of the environment variable holding this provider's credential.
    pub fn credential_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Together => "TOGETHER_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    fn all() -> [Provider; 3] {
        [Provider::Gemini, Provider::Together, Provider::OpenRouter]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Together => write!(f, "together"),
            Provider::OpenRouter => write!(f, "openrouter"),
        }
    }
}

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors produced by a generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The model id maps to no known provider.
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    /// The dispatched provider's credential was absent at construction.
    ///
    /// Raised before any request is sent, so a misconfigured credential can
    /// never produce a malformed call.
    #[error("{provider}: {var} environment variable not set")]
    MissingCredential {
        /// Provider the call was routed to.
        provider: Provider,
        /// Environment variable that was missing.
        var: &'static str,
    },

    /// The HTTP request itself failed (connect, TLS, timeout).
    #[error("{provider} request failed: {source}")]
    Transport {
        /// Provider the call was routed to.
        provider: Provider,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-2xx status.
    #[error("{provider} API error {status}: {body}")]
    Api {
        /// Provider the call was routed to.
        provider: Provider,
        /// HTTP status returned.
        status: StatusCode,
        /// Response body, read as diagnostic text.
        body: String,
    },

    /// A 2xx response carried no text payload where one was expected.
    #[error("{provider} response contained no text payload")]
    EmptyResponse {
        /// Provider the call was routed to.
        provider: Provider,
    },
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Capability contract for text generation.
///
/// Implementations must be thread-safe (Send + Sync) for use behind
/// `Arc<dyn TextGenerator>`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate plain text for `messages` using `model`.
    ///
    /// The response is always normalized plain text; provider-specific
    /// envelope fields are never exposed to callers.
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError>;
}

// ─── Gemini envelope ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    stop_sequences: Vec<String>,
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

impl Default for GeminiGenerationConfig {
    // Fixed sampling parameters; one stop sequence.
    fn default() -> Self {
        Self {
            stop_sequences: vec!["Title".to_string()],
            temperature: 1.5,
            max_output_tokens: 800,
            top_p: 0.8,
            top_k: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Split a provider-agnostic message sequence into Gemini's shape:
/// system messages become a separate system-instruction block, the rest
/// become turns with only `user`/`model` roles.
fn split_gemini_messages(
    messages: &[ChatMessage],
) -> (Option<GeminiSystemInstruction>, Vec<GeminiContent>) {
    let system_parts: Vec<GeminiPart> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| GeminiPart {
            text: m.content.clone(),
        })
        .collect();

    let contents: Vec<GeminiContent> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| GeminiContent {
            role: if m.role == Role::Model { "model" } else { "user" },
            parts: vec![GeminiPart {
                text: m.content.clone(),
            }],
        })
        .collect();

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(GeminiSystemInstruction {
            parts: system_parts,
        })
    };

    (system_instruction, contents)
}

// ─── OpenAI-chat-compatible envelope (Together, OpenRouter) ───────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

// ─── HTTP generator ───────────────────────────────────────────────────────────

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TOGETHER_URL: &str = "https://api.together.xyz/v1/chat/completions";
const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// [`TextGenerator`] implementation dispatching over HTTP to the closed
/// provider set.
///
/// Credentials are captured from the environment once at construction.
/// Endpoints are overridable for tests.
///
/// ## Example
///
/// ```no_run
/// use autoevolve::{ChatMessage, HttpGenerator, TextGenerator};
///
/// # async fn example() -> Result<(), autoevolve::GenerationError> {
/// let generator = HttpGenerator::new();
/// let text = generator
///     .generate(
///         "gemini-2.0-flash-lite",
///         &[ChatMessage::user("say hello")],
///     )
///     .await?;
/// # let _ = text;
/// # Ok(()) }
/// ```
pub struct HttpGenerator {
    client: reqwest::Client,
    credentials: HashMap<Provider, String>,
    gemini_base_url: String,
    together_url: String,
    openrouter_url: String,
    timeout: Duration,
}

impl HttpGenerator {
    /// Create a generator with default endpoints, capturing whichever
    /// provider credentials are present in the environment.
    pub fn new() -> Self {
        let mut credentials = HashMap::new();
        for provider in Provider::all() {
            if let Ok(key) = std::env::var(provider.credential_var()) {
                if !key.trim().is_empty() {
                    credentials.insert(provider, key);
                }
            }
        }

        Self {
            client: reqwest::Client::new(),
            credentials,
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            together_url: TOGETHER_URL.to_string(),
            openrouter_url: OPENROUTER_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the Gemini base URL (tests).
    pub fn with_gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.gemini_base_url = url.into();
        self
    }

    /// Override the Together endpoint URL (tests).
    pub fn with_together_url(mut self, url: impl Into<String>) -> Self {
        self.together_url = url.into();
        self
    }

    /// Override the OpenRouter endpoint URL (tests).
    pub fn with_openrouter_url(mut self, url: impl Into<String>) -> Self {
        self.openrouter_url = url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Verify that `model` is supported and its provider credential is
    /// present, without sending a request.
    ///
    /// The binary calls this at startup so misconfiguration surfaces
    /// immediately rather than at the first 23:55 fire.
    ///
    /// # Errors
    ///
    /// [`GenerationError::UnsupportedModel`] or
    /// [`GenerationError::MissingCredential`].
    pub fn preflight(&self, model: &str) -> Result<(), GenerationError> {
        let provider = Provider::for_model(model)
            .ok_or_else(|| GenerationError::UnsupportedModel(model.to_string()))?;
        self.credential(provider)?;
        Ok(())
    }

    fn credential(&self, provider: Provider) -> Result<&str, GenerationError> {
        self.credentials
            .get(&provider)
            .map(String::as_str)
            .ok_or(GenerationError::MissingCredential {
                provider,
                var: provider.credential_var(),
            })
    }

    async fn generate_gemini(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let provider = Provider::Gemini;
        let key = self.credential(provider)?;
        let (system_instruction, contents) = split_gemini_messages(messages);
        let request = GeminiRequest {
            system_instruction,
            contents,
            generation_config: GeminiGenerationConfig::default(),
        };

        // The credential travels as a query parameter on this provider.
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.gemini_base_url, model, key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|source| GenerationError::Transport { provider, source })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                provider,
                status,
                body,
            });
        }

        let envelope: GeminiResponse = response
            .json()
            .await
            .map_err(|source| GenerationError::Transport { provider, source })?;

        envelope
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(GenerationError::EmptyResponse { provider })
    }

    async fn generate_chat(
        &self,
        provider: Provider,
        url: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let key = self.credential(provider)?;
        let request = ChatRequest { model, messages };

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|source| GenerationError::Transport { provider, source })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                provider,
                status,
                body,
            });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|source| GenerationError::Transport { provider, source })?;

        envelope
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(GenerationError::EmptyResponse { provider })
    }
}

impl Default for HttpGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        let provider = Provider::for_model(model)
            .ok_or_else(|| GenerationError::UnsupportedModel(model.to_string()))?;

        tracing::debug!(%provider, model, turns = messages.len(), "dispatching generation call");

        match provider {
            Provider::Gemini => self.generate_gemini(model, messages).await,
            Provider::Together => {
                self.generate_chat(provider, &self.together_url, model, messages)
                    .await
            }
            Provider::OpenRouter => {
                self.generate_chat(provider, &self.openrouter_url, model, messages)
                    .await
            }
        }
    }
}
