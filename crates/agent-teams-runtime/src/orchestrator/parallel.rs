//! Parallel-team orchestrator (§4.2): resolves shared capacity for a batch
//! of team runs, derives each team's per-run LLM budget, dispatches via the
//! same bounded-concurrency executor used within a single team, and
//! aggregates outcomes across the batch.

use std::sync::Arc;

use crate::admission::{AdmissionController, CapacityKind, ParallelCapacityResult};
use crate::cancel::CancelToken;
use crate::config::RuntimeConfig;
use crate::error::OutcomeCode;
use crate::outcome::{aggregate_outcome, CompletionTally};
use crate::penalty::{AdaptivePenalty, PenaltyReason};

use super::executor_pool::run_with_concurrency_limit;
use super::team::{run_team, synthesize_failed_outcome, team_outcome_code, RunTeamOutcome, RunTeamRequest, TeamRuntimeDeps};

/// One team's request within a parallel batch.
pub struct ParallelTeamSpec {
    pub request: RunTeamRequest,
}

/// The batch result: one outcome per requested team (input order preserved),
/// plus the parallelism actually applied and the aggregate outcome code.
pub struct ParallelRunResult {
    pub outcomes: Vec<RunTeamOutcome>,
    pub applied_team_parallelism: usize,
    pub applied_member_parallelism: usize,
    pub capacity_reduced: bool,
    pub aggregate_outcome: OutcomeCode,
    pub aggregate_retry_recommended: bool,
}

/// `floor(maxTotalActiveLlm / appliedTeamParallelism)`, clamped to at least 1
/// so a single team is never starved to zero (§4.2 budget-derivation note).
fn derive_per_team_llm_budget(max_total_active_llm: u32, applied_team_parallelism: usize) -> usize {
    if applied_team_parallelism == 0 {
        return 1;
    }
    ((max_total_active_llm as usize) / applied_team_parallelism).max(1)
}

/// Runs a batch of teams under shared admission control and the adaptive
/// parallelism penalty (§4.2, §4.3, §9's "global singletons" redesign: both
/// are passed in rather than read from process-wide statics).
pub async fn run_teams_parallel(
    deps: Arc<TeamRuntimeDeps>,
    admission: &AdmissionController,
    penalty: &AdaptivePenalty,
    config: &RuntimeConfig,
    mut specs: Vec<ParallelTeamSpec>,
    requested_team_parallelism: usize,
    requested_member_parallelism: usize,
    cancel: CancelToken,
) -> ParallelRunResult {
    if specs.is_empty() {
        return ParallelRunResult {
            outcomes: Vec::new(),
            applied_team_parallelism: 0,
            applied_member_parallelism: 0,
            capacity_reduced: false,
            aggregate_outcome: OutcomeCode::NonretryableFailure,
            aggregate_retry_recommended: false,
        };
    }

    let penalized_team_p = penalty.apply_limit(requested_team_parallelism);
    let penalized_member_p = penalty.apply_limit(requested_member_parallelism);

    let ParallelCapacityResult {
        allowed,
        applied_team_parallelism,
        applied_member_parallelism,
        reduced,
        reservation,
        timed_out,
        aborted,
        ..
    } = admission
        .resolve_parallel_capacity(
            CapacityKind::TeamRun,
            penalized_team_p,
            penalized_member_p,
            config.capacity_wait_ms,
            config.capacity_poll_ms,
            &cancel,
        )
        .await;

    if !allowed {
        let reason = if aborted {
            "orchestration was cancelled while waiting for shared capacity"
        } else if timed_out {
            "timed out waiting for shared capacity"
        } else {
            "shared capacity is exhausted"
        };
        let outcomes: Vec<RunTeamOutcome> = specs
            .iter()
            .map(|spec| synthesize_failed_outcome(&spec.request, reason))
            .collect();
        return ParallelRunResult {
            outcomes,
            applied_team_parallelism: 0,
            applied_member_parallelism: 0,
            capacity_reduced: reduced,
            aggregate_outcome: OutcomeCode::RetryableFailure,
            aggregate_retry_recommended: true,
        };
    }

    let per_team_llm_budget = derive_per_team_llm_budget(config.max_total_active_llm, applied_team_parallelism);

    for spec in &mut specs {
        spec.request.member_parallelism = spec.request.member_parallelism.min(per_team_llm_budget).min(applied_member_parallelism).max(1);
    }

    let deps_for_pool = deps.clone();
    let config_for_pool = config.clone();
    let cancel_for_pool = cancel.clone();

    let outcomes = run_with_concurrency_limit(specs, applied_team_parallelism, move |spec: ParallelTeamSpec| {
        let deps = deps_for_pool.clone();
        let config = config_for_pool.clone();
        let cancel = cancel_for_pool.clone();
        async move { run_team(deps, spec.request, &config, cancel).await }
    })
    .await;

    if let Some(reservation) = reservation {
        admission.release(reservation);
    }

    let mut tally = CompletionTally::default();
    for outcome in &outcomes {
        match team_outcome_code(outcome) {
            OutcomeCode::Success => tally.completed += 1,
            OutcomeCode::PartialSuccess => tally.completed += 1,
            OutcomeCode::RetryableFailure | OutcomeCode::Timeout => tally.failed_retryable += 1,
            OutcomeCode::Cancelled | OutcomeCode::NonretryableFailure => tally.failed_nonretryable += 1,
        }
    }
    let (aggregate_outcome, aggregate_retry_recommended) = aggregate_outcome(tally);

    if reduced || matches!(aggregate_outcome, OutcomeCode::RetryableFailure | OutcomeCode::Timeout) {
        penalty.raise(PenaltyReason::CapacityExhausted);
    } else {
        penalty.lower();
    }

    ParallelRunResult {
        outcomes,
        applied_team_parallelism,
        applied_member_parallelism,
        capacity_reduced: reduced,
        aggregate_outcome,
        aggregate_retry_recommended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member_executor::test_support::ScriptedExecutor;
    use crate::member_executor::MemberResponse;
    use crate::model::{EnabledState, Member, Strategy, TeamDefinition};
    use crate::observer::ObserverSet;
    use crate::rate_limit::InMemoryGate;
    use crate::retry::RetryOptions;
    use chrono::Utc;

    fn member(id: &str) -> Member {
        Member {
            id: id.to_string(),
            role: "worker".to_string(),
            description: String::new(),
            provider: None,
            model: None,
            state: EnabledState::Enabled,
            skill_tags: vec![],
        }
    }

    fn team(id: &str) -> TeamDefinition {
        TeamDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            state: EnabledState::Enabled,
            skill_tags: vec![],
            members: vec![member("a")],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn well_formed() -> String {
        "SUMMARY: s\nCLAIM: c\nEVIDENCE: - e\nCONFIDENCE: 0.8\nRESULT: r\nNEXT_STEP: n\n".to_string()
    }

    fn spec(id: &str) -> ParallelTeamSpec {
        ParallelTeamSpec {
            request: RunTeamRequest {
                team: team(id),
                task: "task".to_string(),
                strategy: Strategy::Sequential,
                communication_rounds: Some(0),
                failed_member_retry_rounds: Some(0),
                member_parallelism: 1,
                agent_timeout_ms: None,
                run_id: None,
            },
        }
    }

    #[tokio::test]
    async fn empty_batch_yields_nonretryable_aggregate() {
        let deps = Arc::new(TeamRuntimeDeps {
            executor: Arc::new(ScriptedExecutor::new(vec![Ok(MemberResponse {
                output: well_formed(),
                latency_ms: 1,
            })])),
            gate: Arc::new(InMemoryGate::new()),
            observer: ObserverSet::new(),
            retry_options: RetryOptions::default(),
        });
        let config = RuntimeConfig::permissive();
        let admission = AdmissionController::new(&config);
        let penalty = AdaptivePenalty::new(config.max_penalty, config.decay_ms);

        let result = run_teams_parallel(deps, &admission, &penalty, &config, vec![], 2, 2, CancelToken::new()).await;
        assert!(result.outcomes.is_empty());
        assert_eq!(result.aggregate_outcome, OutcomeCode::NonretryableFailure);
    }

    #[tokio::test]
    async fn batch_of_two_teams_completes_and_aggregates_success() {
        let deps = Arc::new(TeamRuntimeDeps {
            executor: Arc::new(ScriptedExecutor::new(vec![Ok(MemberResponse {
                output: well_formed(),
                latency_ms: 1,
            })])),
            gate: Arc::new(InMemoryGate::new()),
            observer: ObserverSet::new(),
            retry_options: RetryOptions::default(),
        });
        let config = RuntimeConfig::permissive();
        let admission = AdmissionController::new(&config);
        let penalty = AdaptivePenalty::new(config.max_penalty, config.decay_ms);

        let result = run_teams_parallel(
            deps,
            &admission,
            &penalty,
            &config,
            vec![spec("t1"), spec("t2")],
            2,
            2,
            CancelToken::new(),
        )
        .await;

        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.aggregate_outcome, OutcomeCode::Success);
        assert!(result.applied_team_parallelism >= 1);
    }

    #[tokio::test]
    async fn exhausted_capacity_synthesizes_failed_outcomes_for_every_team() {
        let deps = Arc::new(TeamRuntimeDeps {
            executor: Arc::new(ScriptedExecutor::new(vec![Ok(MemberResponse {
                output: well_formed(),
                latency_ms: 1,
            })])),
            gate: Arc::new(InMemoryGate::new()),
            observer: ObserverSet::new(),
            retry_options: RetryOptions::default(),
        });
        let mut config = RuntimeConfig::permissive();
        config.max_total_active_requests = 0;
        config.max_total_active_llm = 0;
        config.capacity_wait_ms = 20;
        config.capacity_poll_ms = 5;
        let admission = AdmissionController::new(&config);
        let penalty = AdaptivePenalty::new(config.max_penalty, config.decay_ms);

        let result = run_teams_parallel(
            deps,
            &admission,
            &penalty,
            &config,
            vec![spec("t1"), spec("t2")],
            1,
            1,
            CancelToken::new(),
        )
        .await;

        assert_eq!(result.outcomes.len(), 2);
        assert!(result.outcomes.iter().all(|o| o.record.status == crate::model::RunStatus::Failed));
        assert_eq!(result.aggregate_outcome, OutcomeCode::RetryableFailure);
    }
}
