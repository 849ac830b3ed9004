//! `runTeam` (§4.1): Prepare → Initial → Communication rounds → Failed-member
//! retry rounds → Final judge. Persistence is the storage layer's job; this
//! module only produces the record and raw results/audit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::cancel::CancelToken;
use crate::config::RuntimeConfig;
use crate::constants::generate_run_id;
use crate::judge;
use crate::member_executor::{MemberExecutor, MemberRequest};
use crate::model::{
    CommunicationAuditEntry, FinalJudge, Member, MemberResult, MemberStatus, PartnerSnapshot,
    RunStatus, Strategy, TeamDefinition, TeamRunRecord,
};
use crate::error::OutcomeCode;
use crate::normalize;
use crate::observer::{ObserverSet, Phase};
use crate::outcome::{classify_outcome, extract_status_code};
use crate::rate_limit::SharedGate;
use crate::retry::{self, RetryOptions};

use super::communication::{build_communication_context, context_preview, detect_partner_references, extract_partner_context};
use super::executor_pool::run_with_concurrency_limit;

/// Shared, cloneable dependencies every member dispatch needs.
#[derive(Clone)]
pub struct TeamRuntimeDeps {
    pub executor: Arc<dyn MemberExecutor>,
    pub gate: Arc<dyn SharedGate>,
    pub observer: ObserverSet,
    pub retry_options: RetryOptions,
}

/// One `runTeam` invocation's inputs. `member_parallelism` is assumed
/// already resolved by the admission controller (§4.3) before this is
/// called — `run_team` itself has no notion of shared capacity.
#[derive(Clone)]
pub struct RunTeamRequest {
    pub team: TeamDefinition,
    pub task: String,
    pub strategy: Strategy,
    pub communication_rounds: Option<u32>,
    pub failed_member_retry_rounds: Option<u32>,
    pub member_parallelism: usize,
    pub agent_timeout_ms: Option<u64>,
    pub run_id: Option<String>,
}

pub struct RunTeamOutcome {
    pub record: TeamRunRecord,
    pub member_results: Vec<MemberResult>,
    pub audit: Vec<CommunicationAuditEntry>,
}

/// §9 open question, decided: an explicit caller-requested round count only
/// survives stable profile's normal force-to-zero when
/// `allow_caller_override_of_stable_zero` is set.
fn resolve_rounds(requested: Option<u32>, config_default: u32, max: u32, stable_profile: bool, allow_override: bool) -> u32 {
    match requested {
        Some(_) if stable_profile && !allow_override => 0,
        Some(requested) => requested.min(max),
        None => config_default,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    Quality,
    Transient,
    RateLimit,
    Capacity,
    Other,
}

fn classify_failure(result: &MemberResult) -> FailureClass {
    let message = result.error.as_deref().unwrap_or("");
    let lower = message.to_lowercase();
    if lower.contains("capacity") {
        return FailureClass::Capacity;
    }
    if let Some(code) = extract_status_code(message) {
        if code == 429 {
            return FailureClass::RateLimit;
        }
        if (500..600).contains(&code) {
            return FailureClass::Transient;
        }
    }
    if result.output.trim().is_empty() {
        return FailureClass::Quality;
    }
    FailureClass::Other
}

async fn dispatch_member(
    deps: &TeamRuntimeDeps,
    member: &Member,
    prompt: String,
    phase: Phase,
    timeout_ms: u64,
    cancel: &CancelToken,
) -> MemberResult {
    deps.observer.member_start(&member.id, phase);

    let rate_limit_key = member
        .model
        .clone()
        .or_else(|| member.provider.clone())
        .unwrap_or_else(|| "default".to_string());
    let mut options = deps.retry_options.clone();
    options.rate_limit_key = Some(rate_limit_key);

    let executor = deps.executor.clone();
    let provider = member.provider.clone();
    let model = member.model.clone();

    let started = Instant::now();
    let dispatch_result = retry::execute_with_retry(
        deps.gate.as_ref(),
        &options,
        cancel,
        retry::default_should_retry,
        |_attempt, _delay_ms, _err| {},
        |_wait_ms| {},
        || {
            let executor = executor.clone();
            let provider = provider.clone();
            let model = model.clone();
            let prompt = prompt.clone();
            let cancel_child = cancel.child();
            async move {
                executor
                    .execute(MemberRequest {
                        provider,
                        model,
                        prompt,
                        timeout_ms,
                        cancel: cancel_child,
                    })
                    .await
            }
        },
    )
    .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let result = match dispatch_result {
        Ok(response) => match normalize::validate_and_normalize(&response.output) {
            Ok(normalized) => MemberResult {
                member_id: member.id.clone(),
                role: member.role.clone(),
                status: MemberStatus::Completed,
                summary: normalize::extract_labeled_field(&normalized.text, "SUMMARY").unwrap_or_default(),
                output: normalized.text,
                latency_ms: response.latency_ms.max(elapsed_ms),
                error: None,
                diagnostics: normalized.diagnostics,
            },
            Err(failure) => MemberResult::failed(member.id.clone(), member.role.clone(), failure.0),
        },
        Err(err) => MemberResult::failed(member.id.clone(), member.role.clone(), err.to_string()),
    };

    deps.observer.member_result(&result);
    deps.observer.member_end(&member.id, phase, &result);
    result
}

/// Builds a degraded, already-failed run record: the empty-team Prepare
/// path and the capacity-exhausted synthesis path in the parallel
/// orchestrator both need this shape (§4.1 failure semantics, §4.2 "caller
/// gets one record per requested team").
pub fn synthesize_failed_outcome(request: &RunTeamRequest, reason: impl Into<String>) -> RunTeamOutcome {
    let run_id = request.run_id.clone().unwrap_or_else(generate_run_id);
    let now = Utc::now();
    let final_judge = judge::fallback_judge(&[]);
    let record = TeamRunRecord {
        run_id: run_id.clone(),
        team_id: request.team.id.clone(),
        strategy: request.strategy,
        task: request.task.clone(),
        communication_rounds: 0,
        failed_member_retry_rounds_configured: 0,
        failed_member_retry_rounds_applied: 0,
        recovered_members: Vec::new(),
        communication_links: HashMap::new(),
        summary: reason.into(),
        status: RunStatus::Failed,
        started_at: now,
        finished_at: now,
        member_count: 0,
        output_file: format!("{run_id}.json"),
        final_judge,
    };
    RunTeamOutcome {
        record,
        member_results: Vec::new(),
        audit: Vec::new(),
    }
}

fn render_summary(status: RunStatus, judge: &FinalJudge, completed: usize, total: usize) -> String {
    format!(
        "{status:?}: {verdict:?} ({completed}/{total} members completed, confidence={confidence:.2})",
        status = status,
        verdict = judge.verdict,
        completed = completed,
        total = total,
        confidence = judge.confidence,
    )
}

pub async fn run_team(
    deps: Arc<TeamRuntimeDeps>,
    request: RunTeamRequest,
    config: &RuntimeConfig,
    cancel: CancelToken,
) -> RunTeamOutcome {
    let started_at: DateTime<Utc> = Utc::now();
    let run_id = request.run_id.clone().unwrap_or_else(generate_run_id);

    let active_members: Vec<Member> = request.team.active_members().into_iter().cloned().collect();
    if active_members.is_empty() {
        deps.observer.team_event("no-active-members");
        return synthesize_failed_outcome(&request, "team has no active members");
    }

    let communication_rounds = resolve_rounds(
        request.communication_rounds,
        config.default_communication_rounds,
        config.max_communication_rounds,
        config.stable_profile,
        config.allow_caller_override_of_stable_zero,
    );
    let retry_rounds_configured = resolve_rounds(
        request.failed_member_retry_rounds,
        config.default_failed_member_retry_rounds,
        config.max_failed_member_retry_rounds,
        config.stable_profile,
        config.allow_caller_override_of_stable_zero,
    );
    let timeout_ms = request.agent_timeout_ms.unwrap_or(config.default_agent_timeout_ms);
    let member_parallelism = request.member_parallelism.max(1);
    let max_partners = config.max_communication_partners;

    deps.observer.team_event("initial-phase-start");

    let mut results: Vec<MemberResult> = match request.strategy {
        Strategy::Parallel => {
            let deps_for_pool = deps.clone();
            let task_for_pool = request.task.clone();
            let cancel_for_pool = cancel.clone();
            run_with_concurrency_limit(active_members.clone(), member_parallelism, move |member: Member| {
                let deps = deps_for_pool.clone();
                let task = task_for_pool.clone();
                let cancel = cancel_for_pool.clone();
                async move { dispatch_member(deps.as_ref(), &member, task, Phase::Initial, timeout_ms, &cancel).await }
            })
            .await
        }
        Strategy::Sequential => {
            let mut out = Vec::with_capacity(active_members.len());
            for member in &active_members {
                out.push(dispatch_member(deps.as_ref(), member, request.task.clone(), Phase::Initial, timeout_ms, &cancel).await);
            }
            out
        }
    };

    deps.observer.team_event("communication-phase-start");
    let mut audit: Vec<CommunicationAuditEntry> = Vec::new();

    for round in 1..=communication_rounds {
        let completed_snapshot: Vec<MemberResult> = results.iter().filter(|r| r.is_completed()).cloned().collect();
        if completed_snapshot.len() < 2 {
            break;
        }

        for source in &completed_snapshot {
            let Some(member) = active_members.iter().find(|m| m.id == source.member_id) else {
                continue;
            };
            let partner_contexts: Vec<_> = completed_snapshot
                .iter()
                .filter(|r| r.member_id != member.id)
                .take(max_partners)
                .map(|r| extract_partner_context(&r.member_id, &r.output))
                .collect();
            let partner_ids: Vec<String> = partner_contexts.iter().map(|p| p.member_id.clone()).collect();
            let context = build_communication_context(&partner_contexts, max_partners);
            let prompt = format!("{}\n\n[PARTNER CONTEXT]\n{}", request.task, context);

            let response = dispatch_member(deps.as_ref(), member, prompt, Phase::Communication, timeout_ms, &cancel).await;
            let (referenced, missing) = detect_partner_references(&response.output, &partner_ids);

            let entry = CommunicationAuditEntry {
                round,
                member_id: member.id.clone(),
                role: member.role.clone(),
                partner_ids,
                referenced_partners: referenced,
                missing_partners: missing,
                context_preview: context_preview(&context),
                partner_snapshots: partner_contexts
                    .iter()
                    .map(|p| PartnerSnapshot {
                        member_id: p.member_id.clone(),
                        summary: p.summary.clone().unwrap_or_default(),
                    })
                    .collect(),
                result_status: response.status,
                claim_references: None,
            };
            deps.observer.communication_audit(&entry);
            audit.push(entry);

            if let Some(slot) = results.iter_mut().find(|r| r.member_id == member.id) {
                *slot = response;
            }
        }
    }

    deps.observer.team_event("retry-phase-start");
    let mut recovered_members: Vec<String> = Vec::new();
    let mut retry_rounds_applied = 0u32;

    for retry_round in 1..=retry_rounds_configured {
        let target_ids: Vec<String> = results
            .iter()
            .filter(|r| {
                if r.is_completed() {
                    return false;
                }
                let class = classify_failure(r);
                if retry_round == 1 {
                    matches!(class, FailureClass::Quality | FailureClass::Transient)
                } else {
                    !matches!(class, FailureClass::RateLimit | FailureClass::Capacity)
                }
            })
            .map(|r| r.member_id.clone())
            .collect();

        if target_ids.is_empty() {
            break;
        }
        retry_rounds_applied = retry_round;

        let completed_snapshot: Vec<MemberResult> = results.iter().filter(|r| r.is_completed()).cloned().collect();

        for target_id in target_ids {
            let Some(member) = active_members.iter().find(|m| m.id == target_id) else {
                continue;
            };
            let partner_contexts: Vec<_> = completed_snapshot
                .iter()
                .filter(|r| r.member_id != member.id)
                .take(max_partners)
                .map(|r| extract_partner_context(&r.member_id, &r.output))
                .collect();
            let context = build_communication_context(&partner_contexts, max_partners);
            let prompt = format!("{}\n\n[PARTNER CONTEXT]\n{}", request.task, context);

            let response = dispatch_member(deps.as_ref(), member, prompt, Phase::Communication, timeout_ms, &cancel).await;
            if response.is_completed() {
                recovered_members.push(target_id.clone());
            }
            if let Some(slot) = results.iter_mut().find(|r| r.member_id == target_id) {
                *slot = response;
            }
        }
    }

    deps.observer.team_event("judge-phase-start");
    let final_judge = judge::judge(&results);
    let completed_count = results.iter().filter(|r| r.is_completed()).count();
    let status = if completed_count == 0 { RunStatus::Failed } else { RunStatus::Completed };

    let mut communication_links: HashMap<String, Vec<String>> = HashMap::new();
    for entry in &audit {
        let links = communication_links.entry(entry.member_id.clone()).or_default();
        links.extend(entry.referenced_partners.clone());
    }
    for links in communication_links.values_mut() {
        links.sort();
        links.dedup();
    }

    let finished_at = Utc::now();
    let summary = render_summary(status, &final_judge, completed_count, results.len());

    deps.observer.team_event("finished");

    RunTeamOutcome {
        record: TeamRunRecord {
            run_id: run_id.clone(),
            team_id: request.team.id.clone(),
            strategy: request.strategy,
            task: request.task.clone(),
            communication_rounds,
            failed_member_retry_rounds_configured: retry_rounds_configured,
            failed_member_retry_rounds_applied: retry_rounds_applied,
            recovered_members,
            communication_links,
            summary,
            status,
            started_at,
            finished_at,
            member_count: active_members.len(),
            output_file: format!("{run_id}.json"),
            final_judge,
        },
        member_results: results,
        audit,
    }
}

/// Classifies a finished team run's outcome for aggregation purposes
/// (§4.2), independent of the coarse `RunStatus` persisted on the record.
pub fn team_outcome_code(outcome: &RunTeamOutcome) -> OutcomeCode {
    let any_completed = outcome.member_results.iter().any(|r| r.is_completed());
    let any_failed = outcome.member_results.iter().any(|r| !r.is_completed());

    if !any_failed && any_completed {
        return OutcomeCode::Success;
    }
    if any_completed && any_failed {
        return OutcomeCode::PartialSuccess;
    }

    let any_retryable = outcome.member_results.iter().any(|r| {
        if r.is_completed() {
            return false;
        }
        let message = r.error.as_deref().unwrap_or("");
        let status = extract_status_code(message);
        matches!(
            classify_outcome(false, false, status, message, r.output.trim().is_empty()),
            OutcomeCode::RetryableFailure | OutcomeCode::Timeout
        )
    });

    if any_retryable {
        OutcomeCode::RetryableFailure
    } else {
        OutcomeCode::NonretryableFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member_executor::test_support::ScriptedExecutor;
    use crate::member_executor::MemberResponse;
    use crate::model::EnabledState;
    use crate::rate_limit::InMemoryGate;

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

    fn team(members: Vec<Member>) -> TeamDefinition {
        TeamDefinition {
            id: "team-1".to_string(),
            name: "Team One".to_string(),
            description: String::new(),
            state: EnabledState::Enabled,
            skill_tags: vec![],
            members,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ok_response(text: &str) -> crate::error::RuntimeResult<MemberResponse> {
        Ok(MemberResponse {
            output: text.to_string(),
            latency_ms: 5,
        })
    }

    fn deps_with_script(script: Vec<crate::error::RuntimeResult<MemberResponse>>) -> Arc<TeamRuntimeDeps> {
        Arc::new(TeamRuntimeDeps {
            executor: Arc::new(ScriptedExecutor::new(script)),
            gate: Arc::new(InMemoryGate::new()),
            observer: ObserverSet::new(),
            retry_options: RetryOptions::default(),
        })
    }

    fn well_formed(tag: &str) -> String {
        format!("SUMMARY: {tag}\nCLAIM: {tag} holds\nEVIDENCE: - a\nCONFIDENCE: 0.8\nRESULT: done\nNEXT_STEP: none\n")
    }

    #[tokio::test]
    async fn empty_team_synthesizes_a_failed_record() {
        let deps = deps_with_script(vec![ok_response(&well_formed("x"))]);
        let request = RunTeamRequest {
            team: team(vec![]),
            task: "do it".to_string(),
            strategy: Strategy::Parallel,
            communication_rounds: None,
            failed_member_retry_rounds: None,
            member_parallelism: 1,
            agent_timeout_ms: None,
            run_id: None,
        };
        let config = RuntimeConfig::stable_profile();
        let outcome = run_team(deps, request, &config, CancelToken::new()).await;
        assert_eq!(outcome.record.status, RunStatus::Failed);
        assert_eq!(outcome.record.member_count, 0);
    }

    #[tokio::test]
    async fn stable_profile_runs_zero_communication_and_retry_rounds() {
        let deps = deps_with_script(vec![ok_response(&well_formed("a"))]);
        let request = RunTeamRequest {
            team: team(vec![member("a")]),
            task: "task".to_string(),
            strategy: Strategy::Parallel,
            communication_rounds: None,
            failed_member_retry_rounds: None,
            member_parallelism: 1,
            agent_timeout_ms: None,
            run_id: None,
        };
        let config = RuntimeConfig::stable_profile();
        let outcome = run_team(deps, request, &config, CancelToken::new()).await;
        assert_eq!(outcome.record.communication_rounds, 0);
        assert_eq!(outcome.record.failed_member_retry_rounds_configured, 0);
        assert_eq!(outcome.record.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn permissive_profile_runs_communication_rounds_between_completed_members() {
        let script = vec![
            ok_response(&well_formed("a")),
            ok_response(&well_formed("b")),
            ok_response("SUMMARY: a2\nCLAIM: references b\nEVIDENCE: - e\nCONFIDENCE: 0.9\nRESULT: ok\nNEXT_STEP: none\n"),
            ok_response("SUMMARY: b2\nCLAIM: references a\nEVIDENCE: - e\nCONFIDENCE: 0.9\nRESULT: ok\nNEXT_STEP: none\n"),
        ];
        let deps = deps_with_script(script);
        let request = RunTeamRequest {
            team: team(vec![member("a"), member("b")]),
            task: "task".to_string(),
            strategy: Strategy::Sequential,
            communication_rounds: Some(1),
            failed_member_retry_rounds: Some(0),
            member_parallelism: 1,
            agent_timeout_ms: None,
            run_id: None,
        };
        let config = RuntimeConfig::permissive();
        let outcome = run_team(deps, request, &config, CancelToken::new()).await;
        assert_eq!(outcome.record.communication_rounds, 1);
        assert_eq!(outcome.audit.len(), 2);
    }

    #[tokio::test]
    async fn failed_member_is_recovered_in_retry_round() {
        let script = vec![
            Err(crate::error::RuntimeError::Transient("network blip".to_string())),
            ok_response(&well_formed("a-recovered")),
        ];
        let deps = deps_with_script(script);
        let request = RunTeamRequest {
            team: team(vec![member("a")]),
            task: "task".to_string(),
            strategy: Strategy::Sequential,
            communication_rounds: Some(0),
            failed_member_retry_rounds: Some(1),
            member_parallelism: 1,
            agent_timeout_ms: None,
            run_id: None,
        };
        let config = RuntimeConfig::permissive();
        let outcome = run_team(deps, request, &config, CancelToken::new()).await;
        assert_eq!(outcome.record.recovered_members, vec!["a".to_string()]);
        assert_eq!(outcome.record.failed_member_retry_rounds_applied, 1);
    }

    #[tokio::test]
    async fn cancellation_before_dispatch_yields_failed_member_results() {
        let deps = deps_with_script(vec![ok_response(&well_formed("a"))]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let request = RunTeamRequest {
            team: team(vec![member("a")]),
            task: "task".to_string(),
            strategy: Strategy::Sequential,
            communication_rounds: None,
            failed_member_retry_rounds: None,
            member_parallelism: 1,
            agent_timeout_ms: None,
            run_id: None,
        };
        let config = RuntimeConfig::stable_profile();
        let outcome = run_team(deps, request, &config, cancel).await;
        assert!(outcome.member_results.iter().all(|r| !r.is_completed()));
    }

    #[test]
    fn team_outcome_code_classifies_partial_success() {
        let outcome = RunTeamOutcome {
            record: TeamRunRecord {
                run_id: "r".to_string(),
                team_id: "t".to_string(),
                strategy: Strategy::Parallel,
                task: "t".to_string(),
                communication_rounds: 0,
                failed_member_retry_rounds_configured: 0,
                failed_member_retry_rounds_applied: 0,
                recovered_members: vec![],
                communication_links: HashMap::new(),
                summary: String::new(),
                status: RunStatus::Completed,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                member_count: 2,
                output_file: String::new(),
                final_judge: judge::fallback_judge(&[]),
            },
            member_results: vec![
                MemberResult {
                    member_id: "a".to_string(),
                    role: "worker".to_string(),
                    status: MemberStatus::Completed,
                    summary: "ok".to_string(),
                    output: "ok".to_string(),
                    latency_ms: 1,
                    error: None,
                    diagnostics: Default::default(),
                },
                MemberResult::failed("b", "worker", "schema mismatch"),
            ],
            audit: vec![],
        };
        assert_eq!(team_outcome_code(&outcome), OutcomeCode::PartialSuccess);
    }
}
