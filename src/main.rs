//! Daily auto-evolve daemon.
//!
//! Wires the history probe, content mutator, and git publisher into the
//! daily orchestrator and parks until ctrl-c.
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json`: structured JSON output (production)
//! - `RUST_LOG=info`: log level filter
//! - See `config` and `generator` module docs for the pipeline variables.

use std::sync::Arc;

use autoevolve::{
    init_tracing, ActivityProbe, ArtifactMutator, ArtifactPublisher, ContentMutator,
    DailyOrchestrator, EvolveConfig, GitHubProbe, GitPublisher, HttpGenerator,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Best-effort .env for local runs; real deployments set the environment.
    dotenvy::dotenv().ok();
    let _ = init_tracing();

    let cfg = EvolveConfig::from_env()?;

    // Surface a bad model id or missing provider credential now, not at the
    // first 23:55 fire.
    let generator = HttpGenerator::new();
    generator.preflight(&cfg.model)?;

    info!(
        owner = %cfg.owner,
        repo = %cfg.repo,
        branch = %cfg.branch,
        model = %cfg.model,
        artifact = %cfg.artifact.display(),
        "autoevolve starting"
    );

    let probe: Arc<dyn ActivityProbe> =
        Arc::new(GitHubProbe::new(&cfg.owner, &cfg.repo, &cfg.github_token));

    let mutator: Arc<dyn ArtifactMutator> = Arc::new(ContentMutator::new(
        Arc::new(generator),
        &cfg.model,
        cfg.repo_dir.join(&cfg.artifact),
    ));

    let publisher: Arc<dyn ArtifactPublisher> = Arc::new(GitPublisher::new(
        &cfg.repo_dir,
        &cfg.artifact,
        &cfg.commit_message,
        &cfg.branch,
    ));

    let orchestrator = Arc::new(DailyOrchestrator::new(probe, mutator, publisher));
    let scheduler = orchestrator.spawn_daily();

    tokio::select! {
        _ = scheduler => info!("scheduler task ended"),
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received — shutting down"),
    }

    Ok(())
}
