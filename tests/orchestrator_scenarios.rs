//! End-to-end scenarios for `src/orchestrator.rs` with stub collaborators.
//!
//! Exercises the contracts that make the pipeline safe to re-run:
//! - Idempotency: activity present → mutator/publisher never invoked
//! - Exactly-once mutation per inactive day
//! - Fail closed: a probe error means no mutation, outcome = Failed
//! - Fault isolation: a failing generator leaves the artifact untouched
//! - Overlap: a fire during a running run is skipped

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use autoevolve::{
    ActivityProbe, ActivityWindow, ArtifactMutator, ArtifactPublisher, ChatMessage,
    ContentMutator, DailyOrchestrator, GenerationError, MutationError, ProbeError, Provider,
    PublishError, RunOutcome, SkipReason, TextGenerator,
};

// ============================================================================
// Stub collaborators
// ============================================================================

/// What the stub probe should answer.
#[derive(Clone, Copy)]
enum ProbeScript {
    Active,
    Quiet,
    /// Fail with a 500, like a hosting API outage.
    Outage,
    /// Answer `Quiet` after a delay, to hold a run open.
    SlowQuiet(u64),
}

struct StubProbe {
    script: ProbeScript,
    calls: AtomicUsize,
}

impl StubProbe {
    fn new(script: ProbeScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ActivityProbe for StubProbe {
    async fn has_activity(&self, _window: &ActivityWindow) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            ProbeScript::Active => Ok(true),
            ProbeScript::Quiet => Ok(false),
            ProbeScript::Outage => Err(ProbeError::Api {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "outage".to_string(),
            }),
            ProbeScript::SlowQuiet(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(false)
            }
        }
    }
}

struct StubMutator {
    fail: bool,
    calls: AtomicUsize,
}

impl StubMutator {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ArtifactMutator for StubMutator {
    async fn mutate(&self) -> Result<(), MutationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(MutationError::MissingFence)
        } else {
            Ok(())
        }
    }
}

struct StubPublisher {
    fail: bool,
    calls: AtomicUsize,
}

impl StubPublisher {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ArtifactPublisher for StubPublisher {
    async fn publish(&self) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(PublishError::Failed {
                op: autoevolve::GitOp::Push,
                stderr: "remote rejected".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn orchestrator(
    probe: Arc<StubProbe>,
    mutator: Arc<StubMutator>,
    publisher: Arc<StubPublisher>,
) -> Arc<DailyOrchestrator> {
    Arc::new(DailyOrchestrator::new(probe, mutator, publisher))
}

// ============================================================================
// Scenario 1 — quiet day: mutate once, publish once, Succeeded
// ============================================================================

#[tokio::test]
async fn test_quiet_day_mutates_and_publishes_exactly_once() {
    let probe = StubProbe::new(ProbeScript::Quiet);
    let mutator = StubMutator::new(false);
    let publisher = StubPublisher::new(false);
    let orch = orchestrator(probe.clone(), mutator.clone(), publisher.clone());

    let outcome = orch.run().await;

    assert!(matches!(outcome, RunOutcome::Succeeded));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    assert_eq!(mutator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Scenario 2 — activity exists: skipped, downstream never invoked
// ============================================================================

#[tokio::test]
async fn test_activity_present_skips_and_never_touches_downstream() {
    let probe = StubProbe::new(ProbeScript::Active);
    let mutator = StubMutator::new(false);
    let publisher = StubPublisher::new(false);
    let orch = orchestrator(probe.clone(), mutator.clone(), publisher.clone());

    // Idempotency: however many times run() is called, nothing mutates.
    for _ in 0..5 {
        let outcome = orch.run().await;
        assert!(matches!(
            outcome,
            RunOutcome::Skipped(SkipReason::ActivityExists)
        ));
    }
    assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
    assert_eq!(mutator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Scenario 3 — probe outage: Failed, nothing mutated (fail closed)
// ============================================================================

#[tokio::test]
async fn test_probe_outage_fails_closed_without_mutating() {
    let probe = StubProbe::new(ProbeScript::Outage);
    let mutator = StubMutator::new(false);
    let publisher = StubPublisher::new(false);
    let orch = orchestrator(probe.clone(), mutator.clone(), publisher.clone());

    let outcome = orch.run().await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(
        mutator.calls.load(Ordering::SeqCst),
        0,
        "an unknown probe answer must never be treated as quiet"
    );
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failure propagation
// ============================================================================

#[tokio::test]
async fn test_mutator_failure_stops_before_publish() {
    let probe = StubProbe::new(ProbeScript::Quiet);
    let mutator = StubMutator::new(true);
    let publisher = StubPublisher::new(false);
    let orch = orchestrator(probe.clone(), mutator.clone(), publisher.clone());

    let outcome = orch.run().await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(mutator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        publisher.calls.load(Ordering::SeqCst),
        0,
        "publish must not run after a failed mutation"
    );
}

#[tokio::test]
async fn test_publisher_failure_is_a_failed_outcome() {
    let probe = StubProbe::new(ProbeScript::Quiet);
    let mutator = StubMutator::new(false);
    let publisher = StubPublisher::new(true);
    let orch = orchestrator(probe, mutator, publisher.clone());

    let outcome = orch.run().await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(publisher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_run_retries_cleanly_on_next_fire() {
    // A failure must not leave the in-flight flag set; the next fire runs.
    let probe = StubProbe::new(ProbeScript::Outage);
    let mutator = StubMutator::new(false);
    let publisher = StubPublisher::new(false);
    let orch = orchestrator(probe.clone(), mutator, publisher);

    assert!(matches!(orch.run().await, RunOutcome::Failed(_)));
    assert!(matches!(orch.run().await, RunOutcome::Failed(_)));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Overlap guard
// ============================================================================

#[tokio::test]
async fn test_overlapping_fire_is_skipped() {
    let probe = StubProbe::new(ProbeScript::SlowQuiet(300));
    let mutator = StubMutator::new(false);
    let publisher = StubPublisher::new(false);
    let orch = orchestrator(probe, mutator.clone(), publisher);

    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run().await })
    };
    // Let the first run reach the slow probe before firing again.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = orch.run().await;
    assert!(matches!(
        second,
        RunOutcome::Skipped(SkipReason::RunInProgress)
    ));

    let first = first.await.expect("first run must join");
    assert!(matches!(first, RunOutcome::Succeeded));
    assert_eq!(
        mutator.calls.load(Ordering::SeqCst),
        1,
        "only the first fire may mutate"
    );
}

// ============================================================================
// Fault isolation with a real mutator and artifact
// ============================================================================

struct ScriptedGenerator {
    response: Result<&'static str, ()>,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
    ) -> Result<String, GenerationError> {
        match self.response {
            Ok(text) => Ok(text.to_string()),
            Err(()) => Err(GenerationError::EmptyResponse {
                provider: Provider::Gemini,
            }),
        }
    }
}

#[tokio::test]
async fn test_failing_generator_leaves_artifact_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = dir.path().join("target.js");
    std::fs::write(&artifact, "const original = true;\n").expect("seed artifact");

    let mutator = ContentMutator::new(
        Arc::new(ScriptedGenerator { response: Err(()) }),
        "gemini-2.0-flash-lite",
        &artifact,
    );

    let result = mutator.mutate().await;
    assert!(result.is_err());
    assert_eq!(
        std::fs::read_to_string(&artifact).expect("artifact readable"),
        "const original = true;\n",
        "a failed generation must not modify the artifact"
    );
}

#[tokio::test]
async fn test_unfenced_response_leaves_artifact_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = dir.path().join("target.js");
    std::fs::write(&artifact, "const original = true;\n").expect("seed artifact");

    let mutator = ContentMutator::new(
        Arc::new(ScriptedGenerator {
            response: Ok("I'm sorry, I cannot edit this file."),
        }),
        "gemini-2.0-flash-lite",
        &artifact,
    );

    let result = mutator.mutate().await;
    assert!(matches!(result, Err(MutationError::MissingFence)));
    assert_eq!(
        std::fs::read_to_string(&artifact).expect("artifact readable"),
        "const original = true;\n"
    );
}

#[tokio::test]
async fn test_fenced_response_rewrites_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifact = dir.path().join("target.js");
    std::fs::write(&artifact, "const original = true;\n").expect("seed artifact");

    let mutator = ContentMutator::new(
        Arc::new(ScriptedGenerator {
            response: Ok("```js\nconst evolved = true;\n```"),
        }),
        "gemini-2.0-flash-lite",
        &artifact,
    );

    mutator.mutate().await.expect("mutation should succeed");
    assert_eq!(
        std::fs::read_to_string(&artifact).expect("artifact readable"),
        "const evolved = true;\n"
    );
}
