//! Core data model (§3): teams, members, results, audit entries, judge, and
//! run records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enabled-state of a [`TeamDefinition`] or [`Member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnabledState {
    Enabled,
    Disabled,
}

impl EnabledState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, EnabledState::Enabled)
    }
}

/// One independent worker within a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Stable id, unique within its team.
    pub id: String,
    pub role: String,
    pub description: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub state: EnabledState,
    pub skill_tags: Vec<String>,
}

impl Member {
    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }
}

/// A named group of Members sharing a mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub state: EnabledState,
    pub skill_tags: Vec<String>,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamDefinition {
    /// Active members: enabled members of an enabled team, in definition order.
    pub fn active_members(&self) -> Vec<&Member> {
        if !self.state.is_enabled() {
            return Vec::new();
        }
        self.members.iter().filter(|m| m.is_enabled()).collect()
    }

    /// Invariant: at least one enabled Member for a runnable team.
    pub fn is_runnable(&self) -> bool {
        self.state.is_enabled() && !self.active_members().is_empty()
    }
}

/// Execution strategy for a team run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Parallel,
    Sequential,
}

/// Status of a single member dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Completed,
    Failed,
}

/// Per-member diagnostics extracted from a normalized output (§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Diagnostics {
    pub confidence: f64,
    pub evidence_count: u32,
    pub contradiction_signals: u32,
    pub conflict_signals: u32,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            evidence_count: 0,
            contradiction_signals: 0,
            conflict_signals: 0,
        }
    }
}

/// The outcome of one member's dispatch, for one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResult {
    pub member_id: String,
    pub role: String,
    pub status: MemberStatus,
    pub summary: String,
    pub output: String,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub diagnostics: Diagnostics,
}

impl MemberResult {
    /// Builds the canonical failed-result shape used whenever a dispatch errors (§4.1 failure semantics).
    pub fn failed(member_id: impl Into<String>, role: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            role: role.into(),
            status: MemberStatus::Failed,
            summary: "(failed)".to_string(),
            output: String::new(),
            latency_ms: 0,
            error: Some(error.into()),
            diagnostics: Diagnostics {
                confidence: 0.0,
                evidence_count: 0,
                contradiction_signals: 0,
                conflict_signals: 0,
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, MemberStatus::Completed)
    }
}

/// Audit trail of one member's participation in one communication round (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationAuditEntry {
    pub round: u32,
    pub member_id: String,
    pub role: String,
    pub partner_ids: Vec<String>,
    pub referenced_partners: Vec<String>,
    pub missing_partners: Vec<String>,
    pub context_preview: String,
    pub partner_snapshots: Vec<PartnerSnapshot>,
    pub result_status: MemberStatus,
    pub claim_references: Option<Vec<String>>,
}

/// A single partner's contribution as seen by another member in a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerSnapshot {
    pub member_id: String,
    pub summary: String,
}

/// Final verdict categories (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Converged,
    Partial,
    Diverged,
    Failed,
}

/// The final judge's aggregated verdict and uncertainty triple (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalJudge {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reason: String,
    pub next_step: String,
    pub u_intra: f64,
    pub u_inter: f64,
    pub u_sys: f64,
    pub collapse_signals: Vec<String>,
}

/// Run status, once the orchestrator has finished all phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// The persisted record of one team run (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRunRecord {
    pub run_id: String,
    pub team_id: String,
    pub strategy: Strategy,
    pub task: String,
    pub communication_rounds: u32,
    pub failed_member_retry_rounds_configured: u32,
    pub failed_member_retry_rounds_applied: u32,
    pub recovered_members: Vec<String>,
    pub communication_links: HashMap<String, Vec<String>>,
    pub summary: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub member_count: usize,
    pub output_file: String,
    pub final_judge: FinalJudge,
}

impl TeamRunRecord {
    /// Invariant: `recoveredMembers ⊆ activeMemberIds`.
    pub fn recovered_members_are_subset_of(&self, active_member_ids: &[String]) -> bool {
        self.recovered_members
            .iter()
            .all(|m| active_member_ids.contains(m))
    }

    /// Invariant: `failedMemberRetryApplied ≤ failedMemberRetryRounds`.
    pub fn retry_rounds_applied_within_budget(&self) -> bool {
        self.failed_member_retry_rounds_applied <= self.failed_member_retry_rounds_configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, enabled: bool) -> Member {
        Member {
            id: id.to_string(),
            role: "worker".to_string(),
            description: String::new(),
            provider: None,
            model: None,
            state: if enabled {
                EnabledState::Enabled
            } else {
                EnabledState::Disabled
            },
            skill_tags: vec![],
        }
    }

    #[test]
    fn team_with_no_enabled_members_is_not_runnable() {
        let team = TeamDefinition {
            id: "t1".to_string(),
            name: "Team".to_string(),
            description: String::new(),
            state: EnabledState::Enabled,
            skill_tags: vec![],
            members: vec![member("a", false), member("b", false)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!team.is_runnable());
        assert!(team.active_members().is_empty());
    }

    #[test]
    fn disabled_team_has_no_active_members_even_if_members_enabled() {
        let team = TeamDefinition {
            id: "t1".to_string(),
            name: "Team".to_string(),
            description: String::new(),
            state: EnabledState::Disabled,
            skill_tags: vec![],
            members: vec![member("a", true)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!team.is_runnable());
    }

    #[test]
    fn failed_result_matches_canonical_shape() {
        let r = MemberResult::failed("a", "worker", "boom");
        assert_eq!(r.summary, "(failed)");
        assert_eq!(r.output, "");
        assert_eq!(r.diagnostics.confidence, 0.0);
        assert!(!r.is_completed());
    }
}
