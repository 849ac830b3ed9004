//! User-visible run reports (§7): a one-line status summary, per-team
//! `[ok|failed] <summary>` lines, and the final judge block, formatted the
//! same way regardless of whether the run succeeded — failures carry the
//! fallback judge block so the caller still has signal.

use agent_teams_runtime::{team_outcome_code, FinalJudge, OutcomeCode, ParallelRunResult, RunTeamOutcome};

fn judge_block(judge: &FinalJudge) -> String {
    format!(
        "  verdict={:?} confidence={:.2} uIntra={:.2} uInter={:.2} uSys={:.2}\n  reason: {}\n  next_step: {}{}",
        judge.verdict,
        judge.confidence,
        judge.u_intra,
        judge.u_inter,
        judge.u_sys,
        judge.reason,
        judge.next_step,
        if judge.collapse_signals.is_empty() {
            String::new()
        } else {
            format!("\n  collapse_signals: {}", judge.collapse_signals.join(", "))
        }
    )
}

/// Renders a single team run's report.
pub fn render_team_report(outcome: &RunTeamOutcome) -> String {
    let outcome_code = team_outcome_code(outcome);
    let mut lines = vec![format!(
        "[{}] team {} — {} ({} members, retry_recommended={})",
        status_tag(outcome_code),
        outcome.record.team_id,
        outcome.record.summary,
        outcome.member_results.len(),
        outcome_code.retry_recommended(),
    )];

    for member in &outcome.member_results {
        if member.is_completed() {
            lines.push(format!("  [ok] {}: {}", member.member_id, member.summary));
        } else {
            lines.push(format!(
                "  [failed] {}: {}",
                member.member_id,
                member.error.as_deref().unwrap_or("(no error message)")
            ));
        }
    }

    lines.push(judge_block(&outcome.record.final_judge));
    lines.join("\n")
}

/// Renders a parallel batch report: the reference codebase's
/// "Parallel agent team run completed (N teams, M teammates)" header
/// followed by one [ok|failed] section per team.
pub fn render_batch_report(result: &ParallelRunResult) -> String {
    let teammate_count: usize = result.outcomes.iter().map(|o| o.member_results.len()).sum();
    let mut lines = vec![format!(
        "Parallel agent team run completed ({} teams, {} teammates)",
        result.outcomes.len(),
        teammate_count
    )];
    for outcome in &result.outcomes {
        lines.push(render_team_report(outcome));
    }
    lines.join("\n\n")
}

fn status_tag(code: OutcomeCode) -> &'static str {
    match code {
        OutcomeCode::Success | OutcomeCode::PartialSuccess => "ok",
        _ => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_teams_runtime::{judge, CommunicationAuditEntry, Diagnostics, MemberResult, MemberStatus, RunStatus, Strategy, TeamRunRecord};
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_outcome(member_ok: bool) -> RunTeamOutcome {
        let member = if member_ok {
            MemberResult {
                member_id: "a".to_string(),
                role: "worker".to_string(),
                status: MemberStatus::Completed,
                summary: "looks fine".to_string(),
                output: "looks fine".to_string(),
                latency_ms: 10,
                error: None,
                diagnostics: Diagnostics::default(),
            }
        } else {
            MemberResult::failed("a", "worker", "boom")
        };
        RunTeamOutcome {
            record: TeamRunRecord {
                run_id: "t_1_abcd".to_string(),
                team_id: "team-1".to_string(),
                strategy: Strategy::Parallel,
                task: "investigate".to_string(),
                communication_rounds: 0,
                failed_member_retry_rounds_configured: 0,
                failed_member_retry_rounds_applied: 0,
                recovered_members: vec![],
                communication_links: HashMap::new(),
                summary: "Completed: Converged (1/1 members completed, confidence=0.80)".to_string(),
                status: if member_ok { RunStatus::Completed } else { RunStatus::Failed },
                started_at: Utc::now(),
                finished_at: Utc::now(),
                member_count: 1,
                output_file: "t_1_abcd.json".to_string(),
                final_judge: judge::fallback_judge(&[]),
            },
            member_results: vec![member],
            audit: Vec::<CommunicationAuditEntry>::new(),
        }
    }

    #[test]
    fn ok_member_renders_ok_line() {
        let report = render_team_report(&sample_outcome(true));
        assert!(report.starts_with("[ok]"));
        assert!(report.contains("[ok] a: looks fine"));
    }

    #[test]
    fn failed_member_renders_failed_line_and_judge_block() {
        let report = render_team_report(&sample_outcome(false));
        assert!(report.starts_with("[failed]"));
        assert!(report.contains("[failed] a: boom"));
        assert!(report.contains("verdict="));
    }
}
