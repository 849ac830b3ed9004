use std::sync::Arc;

use agent_teams_cli::cli_args::Args;
use agent_teams_cli::http_executor::{check_endpoint, HttpMemberExecutor};
use agent_teams_cli::report::render_team_report;
use agent_teams_cli::team_file::load_team;
use agent_teams_runtime::{
    CancelToken, FileBackedGate, ObserverSet, PatternStore, Runtime, RunStore, RunArtifact, RunTeamRequest,
    Strategy,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.runtime_config();

    info!(
        endpoint = %args.endpoint_url,
        stable_profile = config.stable_profile,
        max_total_active_llm = config.max_total_active_llm,
        "agent-teams starting"
    );

    if !check_endpoint(&args.endpoint_url, args.api_key.as_deref()).await {
        warn!(endpoint = %args.endpoint_url, "endpoint health check failed — continuing, dispatch will surface the real error");
    }

    let team = load_team(&args.team).context("loading team definition")?;
    if !team.is_runnable() {
        anyhow::bail!("team {} has no enabled members", team.id);
    }

    let executor = Arc::new(HttpMemberExecutor::new(
        args.endpoint_url.clone(),
        args.api_key.clone(),
        args.default_model.clone(),
    ));
    let gate = Arc::new(FileBackedGate::new(args.rate_limit_state_path()));
    let runtime = Runtime::new(config, executor, gate, ObserverSet::new());

    let request = RunTeamRequest {
        team: team.clone(),
        task: args.task.clone(),
        strategy: Strategy::Parallel,
        communication_rounds: args.communication_rounds,
        failed_member_retry_rounds: args.failed_member_retry_rounds,
        member_parallelism: args.member_parallelism,
        agent_timeout_ms: None,
        run_id: None,
    };

    let outcome = runtime.run_team(request, CancelToken::new()).await;
    println!("{}", render_team_report(&outcome));

    let run_store = RunStore::open(&args.state_dir).context("opening run store")?;
    run_store.upsert_team(team.clone()).context("persisting team definition")?;
    let artifact = RunArtifact {
        record: outcome.record.clone(),
        team,
        task: args.task.clone(),
        member_results: outcome.member_results.clone(),
        audit: outcome.audit.clone(),
        shared_context: None,
    };
    run_store.persist_run(&artifact).context("persisting run artifact")?;

    let pattern_store = PatternStore::open(args.state_dir.parent().unwrap_or(&args.state_dir).join("memory"))
        .context("opening pattern store")?;
    if let Err(err) = pattern_store.notify_run_finished(&outcome.record) {
        error!(error = %err, "failed to extract a pattern for this run");
    }

    if outcome.record.status == agent_teams_runtime::RunStatus::Failed {
        anyhow::bail!("team run finished with status=failed");
    }

    Ok(())
}
