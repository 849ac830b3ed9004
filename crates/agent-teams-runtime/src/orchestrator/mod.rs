//! Team orchestration (§4.1, §4.2): bounded-concurrency dispatch, the
//! single-team phase sequence, communication-round context assembly, and
//! the parallel multi-team batch runner.

mod communication;
mod executor_pool;
mod parallel;
mod team;

pub use communication::{build_communication_context, context_preview, detect_partner_references, extract_partner_context, PartnerContext};
pub use executor_pool::run_with_concurrency_limit;
pub use parallel::{run_teams_parallel, ParallelRunResult, ParallelTeamSpec};
pub use team::{run_team, synthesize_failed_outcome, team_outcome_code, RunTeamOutcome, RunTeamRequest, TeamRuntimeDeps};
