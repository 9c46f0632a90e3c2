//! # Commit History Probe
//!
//! ## Responsibility
//! Answer one question: did the tracked repository see any commit activity
//! inside a given window? The window spans the current local calendar day
//! and is recomputed fresh for every run, never cached across midnight.
//!
//! ## Guarantees
//! - Failure is failure: a transport error or non-2xx response surfaces as
//!   [`ProbeError`], never as "no activity".
//! - Bounded: the request carries an explicit timeout.
//! - The bearer credential is never logged.
//!
//! ## NOT Responsible For
//! - Pagination: the window is at most one day; truncation by the remote
//!   API's default page size is a known, accepted limitation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{
    DateTime, Local, LocalResult, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use reqwest::StatusCode;
use thiserror::Error;

const GITHUB_BASE_URL: &str = "https://api.github.com";

/// Client identifier the hosting API requires on every request.
const USER_AGENT: &str = "commit-checker";

// ─── Activity window ──────────────────────────────────────────────────────────

/// Inclusive UTC bounds spanning one calendar day.
///
/// Derived fresh each run; never reused across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    /// Inclusive start of the day.
    pub since: DateTime<Utc>,
    /// Inclusive end of the day (23:59:59).
    pub until: DateTime<Utc>,
}

impl ActivityWindow {
    /// Build a window from explicit bounds (tests and callers that already
    /// hold UTC instants).
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    /// The calendar day containing `now`, expressed as UTC instants.
    ///
    /// The local day's midnight and 23:59:59 are converted to UTC; during a
    /// DST transition an ambiguous local time resolves to its earlier
    /// mapping and a nonexistent one is interpreted as UTC wall-clock.
    pub fn for_day(now: DateTime<Local>) -> Self {
        let day = now.date_naive();
        let start = day.and_time(NaiveTime::MIN);
        let end = start + chrono::Duration::days(1) - chrono::Duration::seconds(1);
        Self {
            since: local_to_utc(start),
            until: local_to_utc(end),
        }
    }
}

fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors produced by a history lookup.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The HTTP request itself failed (connect, TLS, timeout).
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The hosting API answered with a non-2xx status.
    #[error("GitHub API error {status}: {body}")]
    Api {
        /// HTTP status returned.
        status: StatusCode,
        /// Response body, read as diagnostic text.
        body: String,
    },
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Capability contract for the activity check.
#[async_trait]
pub trait ActivityProbe: Send + Sync {
    /// Whether any commit event falls inside `window`.
    ///
    /// An error means the answer is *unknown*; callers must not treat it
    /// as `false`.
    async fn has_activity(&self, window: &ActivityWindow) -> Result<bool, ProbeError>;
}

// ─── GitHub probe ─────────────────────────────────────────────────────────────

/// [`ActivityProbe`] backed by the GitHub commits API.
///
/// Queries `GET /repos/{owner}/{repo}/commits?since=..&until=..` with bearer
/// auth. Commit objects are treated as opaque; only their count matters.
pub struct GitHubProbe {
    client: reqwest::Client,
    base_url: String,
    owner: String,
    repo: String,
    token: String,
    timeout: Duration,
}

impl GitHubProbe {
    /// Create a probe for one repository.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GITHUB_BASE_URL.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ActivityProbe for GitHubProbe {
    async fn has_activity(&self, window: &ActivityWindow) -> Result<bool, ProbeError> {
        let url = format!(
            "{}/repos/{}/{}/commits",
            self.base_url, self.owner, self.repo
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                (
                    "since",
                    window.since.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    "until",
                    window.until.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
            ])
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Api { status, body });
        }

        // Commit events are opaque; window membership is the server's job,
        // the count is ours.
        let commits: Vec<serde_json::Value> = response.json().await?;

        tracing::debug!(
            owner = %self.owner,
            repo = %self.repo,
            count = commits.len(),
            "history probe complete"
        );

        Ok(!commits.is_empty())
    }
}
