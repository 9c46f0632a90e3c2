//! # Daily Orchestrator
//!
//! ## Responsibility
//! Own the daily trigger and drive one run: compute today's activity
//! window, probe history, and, only when no activity is found, mutate and
//! publish. Every run resolves to exactly one [`RunOutcome`], logged as one
//! structured line.
//!
//! ## Guarantees
//! - Boundary: no component error ever crosses into the scheduler task; a
//!   panic-free outcome is produced for every fire.
//! - Fail closed: a probe failure is *not* "no activity"; the run fails
//!   and nothing is mutated.
//! - Re-entrant-safe: an atomic run-in-progress flag skips overlapping
//!   fires (clock shifts, manual invocation in tests).
//! - No in-run retries: the next daily fire is the only retry.
//!
//! ## Data flow
//!
//! ```text
//! run() ─► ActivityWindow::for_day ─► probe.has_activity
//!             │ true  → Skipped(ActivityExists)
//!             │ Err   → Failed (fail closed)
//!             └ false → mutator.mutate ─► publisher.publish ─► Succeeded
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone};
use tracing::{debug, error, info, warn};

use crate::mutator::ArtifactMutator;
use crate::probe::{ActivityProbe, ActivityWindow};
use crate::publisher::ArtifactPublisher;
use crate::EvolveError;

/// Local wall-clock hour of the daily fire.
const FIRE_HOUR: u32 = 23;
/// Local wall-clock minute of the daily fire.
const FIRE_MINUTE: u32 = 55;

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// Why a run took no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The tracked repository already saw activity today.
    ActivityExists,
    /// A previous run had not completed when this one fired.
    RunInProgress,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ActivityExists => write!(f, "activity-exists"),
            SkipReason::RunInProgress => write!(f, "run-in-progress"),
        }
    }
}

/// Resolution of one run. Every run resolves to exactly one of these.
#[derive(Debug)]
pub enum RunOutcome {
    /// No action was needed.
    Skipped(SkipReason),
    /// The artifact was mutated and published.
    Succeeded,
    /// Some step failed; the artifact and remote are in whatever state the
    /// failing step left them (mutation failures leave both untouched).
    Failed(EvolveError),
}

impl RunOutcome {
    /// Short label for logs and assertions.
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Skipped(_) => "skipped",
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed(_) => "failed",
        }
    }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

/// Drives the daily pipeline over its three collaborators.
///
/// Construct with [`new`](Self::new); invoke [`run`](Self::run) directly in
/// tests, or arm the daily trigger with [`spawn_daily`](Self::spawn_daily).
pub struct DailyOrchestrator {
    probe: Arc<dyn ActivityProbe>,
    mutator: Arc<dyn ArtifactMutator>,
    publisher: Arc<dyn ArtifactPublisher>,
    in_flight: AtomicBool,
}

impl DailyOrchestrator {
    /// Wire the orchestrator to its collaborators.
    pub fn new(
        probe: Arc<dyn ActivityProbe>,
        mutator: Arc<dyn ArtifactMutator>,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> Self {
        Self {
            probe,
            mutator,
            publisher,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Execute one run to a [`RunOutcome`].
    ///
    /// Safe to invoke directly, independent of the trigger. Errors from the
    /// collaborators are absorbed here; this never panics and never
    /// propagates an error to the caller.
    pub async fn run(&self) -> RunOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("previous run still in flight; skipping this fire");
            let outcome = RunOutcome::Skipped(SkipReason::RunInProgress);
            self.log_outcome(&outcome);
            return outcome;
        }

        let outcome = self.run_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);
        self.log_outcome(&outcome);
        outcome
    }

    async fn run_inner(&self) -> RunOutcome {
        // "Today" is recomputed on every run; a long-lived process must
        // never act on a stale date after midnight.
        let window = ActivityWindow::for_day(Local::now());

        match self.probe.has_activity(&window).await {
            // Unknown is not "no": fail closed rather than push a redundant
            // mutation during an outage.
            Err(e) => return RunOutcome::Failed(e.into()),
            Ok(true) => return RunOutcome::Skipped(SkipReason::ActivityExists),
            Ok(false) => {}
        }

        if let Err(e) = self.mutator.mutate().await {
            return RunOutcome::Failed(e.into());
        }

        if let Err(e) = self.publisher.publish().await {
            return RunOutcome::Failed(e.into());
        }

        RunOutcome::Succeeded
    }

    fn log_outcome(&self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Succeeded => info!(outcome = "succeeded", "daily run complete"),
            RunOutcome::Skipped(reason) => {
                info!(outcome = "skipped", reason = %reason, "daily run took no action")
            }
            RunOutcome::Failed(e) => {
                error!(outcome = "failed", error = %e, "daily run failed")
            }
        }
    }

    /// Arm the recurring daily trigger as a detached background task.
    ///
    /// The task sleeps until the next 23:55 local time, invokes
    /// [`run`](Self::run), and repeats. The fire delay is recomputed from
    /// the live clock each cycle, so DST shifts shorten or lengthen one
    /// sleep instead of accumulating drift.
    pub fn spawn_daily(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                fire_hour = FIRE_HOUR,
                fire_minute = FIRE_MINUTE,
                "daily trigger armed"
            );
            loop {
                let delay = next_fire_delay(Local::now());
                debug!(secs = delay.as_secs(), "sleeping until next fire");
                tokio::time::sleep(delay).await;
                // run() absorbs every error; nothing can cancel the loop.
                let _ = self.run().await;
            }
        })
    }
}

/// Duration from `now` until the next 23:55 local fire.
///
/// A day on which local 23:55 does not exist (DST spring-forward edge)
/// falls forward to the next day's valid fire.
pub fn next_fire_delay(now: DateTime<Local>) -> std::time::Duration {
    for days_ahead in 0..3 {
        let day = now.date_naive() + chrono::Duration::days(days_ahead);
        let Some(time) = NaiveTime::from_hms_opt(FIRE_HOUR, FIRE_MINUTE, 0) else {
            continue;
        };
        let fire = match Local.from_local_datetime(&day.and_time(time)) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            LocalResult::None => continue,
        };
        if fire > now {
            if let Ok(delay) = (fire - now).to_std() {
                return delay;
            }
        }
    }
    // Unreachable with a sane clock; retry in a minute rather than spin.
    std::time::Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::ActivityExists.to_string(), "activity-exists");
        assert_eq!(SkipReason::RunInProgress.to_string(), "run-in-progress");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RunOutcome::Succeeded.label(), "succeeded");
        assert_eq!(
            RunOutcome::Skipped(SkipReason::ActivityExists).label(),
            "skipped"
        );
        assert_eq!(
            RunOutcome::Failed(EvolveError::Other("x".to_string())).label(),
            "failed"
        );
    }

    #[test]
    fn test_next_fire_is_today_before_the_fire_time() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let delay = next_fire_delay(now);
        // 12:00 → 23:55 is 11 h 55 min
        assert_eq!(delay.as_secs(), (11 * 60 + 55) * 60);
    }

    #[test]
    fn test_next_fire_rolls_to_tomorrow_after_the_fire_time() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 23, 56, 0).unwrap();
        let delay = next_fire_delay(now);
        // 23:56 → next day 23:55 is 23 h 59 min
        assert_eq!(delay.as_secs(), (23 * 60 + 59) * 60);
    }

    #[test]
    fn test_next_fire_exactly_at_fire_time_waits_a_full_day() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 23, 55, 0).unwrap();
        let delay = next_fire_delay(now);
        assert_eq!(delay.as_secs(), 24 * 60 * 60);
    }
}
