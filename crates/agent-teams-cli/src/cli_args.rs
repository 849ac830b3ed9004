//! `clap`-derived CLI args (§6): reads the knobs named in the external
//! interfaces section from flags or env vars and assembles a
//! [`RuntimeConfig`]. The config *loader* stays this thin by design — the
//! library only defines the knobs, this binary only reads them.

use agent_teams_runtime::RuntimeConfig;
use clap::Parser;

/// Runs a team of LLM-driven members against a task.
#[derive(Debug, Parser)]
#[command(name = "agent-teams", version, about)]
pub struct Args {
    /// Path to a JSON team definition (a `TeamDefinition` document).
    #[arg(long)]
    pub team: std::path::PathBuf,

    /// The task every member is dispatched against.
    #[arg(long)]
    pub task: String,

    /// Base URL of the OpenAI-compatible chat-completions endpoint members
    /// are dispatched against.
    #[arg(long, env = "AGENT_TEAMS_ENDPOINT_URL")]
    pub endpoint_url: String,

    /// Bearer token for the endpoint, if required.
    #[arg(long, env = "AGENT_TEAMS_API_KEY")]
    pub api_key: Option<String>,

    /// Model name used when a member specifies none of its own.
    #[arg(long, env = "AGENT_TEAMS_DEFAULT_MODEL", default_value = "default")]
    pub default_model: String,

    /// Base directory for persisted run/team/pattern state
    /// (`<dir>/storage.json`, `<dir>/runs/`, `<dir>/patterns.json`).
    #[arg(long, env = "AGENT_TEAMS_STATE_DIR", default_value = ".pi/agent-teams")]
    pub state_dir: std::path::PathBuf,

    /// Path to the persisted rate-limit gate state file.
    #[arg(
        long,
        env = "AGENT_TEAMS_RATE_LIMIT_STATE",
        default_value = "~/.pi/runtime/retry-rate-limit-state.json"
    )]
    pub rate_limit_state: String,

    /// Forces the deterministic, small-limits stable profile
    /// (`STABLE_RUNTIME_PROFILE`). Defaults to true, matching the library's
    /// own `RuntimeConfig::default()`.
    #[arg(long, env = "STABLE_RUNTIME_PROFILE", default_value_t = true)]
    pub stable_runtime_profile: bool,

    #[arg(long, env = "MAX_COMMUNICATION_ROUNDS")]
    pub max_communication_rounds: Option<u32>,
    #[arg(long, env = "DEFAULT_COMMUNICATION_ROUNDS")]
    pub default_communication_rounds: Option<u32>,
    #[arg(long, env = "MAX_COMMUNICATION_PARTNERS")]
    pub max_communication_partners: Option<usize>,
    #[arg(long, env = "MAX_FAILED_MEMBER_RETRY_ROUNDS")]
    pub max_failed_member_retry_rounds: Option<u32>,
    #[arg(long, env = "DEFAULT_FAILED_MEMBER_RETRY_ROUNDS")]
    pub default_failed_member_retry_rounds: Option<u32>,
    #[arg(long, env = "DEFAULT_AGENT_TIMEOUT_MS")]
    pub default_agent_timeout_ms: Option<u64>,

    #[arg(long, env = "MAX_PARALLEL_TEAMS_PER_RUN")]
    pub max_parallel_teams_per_run: Option<usize>,
    #[arg(long, env = "MAX_PARALLEL_TEAMMATES_PER_TEAM")]
    pub max_parallel_teammates_per_team: Option<usize>,
    #[arg(long, env = "MAX_TOTAL_ACTIVE_REQUESTS")]
    pub max_total_active_requests: Option<u32>,
    #[arg(long, env = "MAX_TOTAL_ACTIVE_LLM")]
    pub max_total_active_llm: Option<u32>,
    #[arg(long, env = "MAX_CONCURRENT_ORCHESTRATIONS")]
    pub max_concurrent_orchestrations: Option<usize>,
    #[arg(long, env = "CAPACITY_WAIT_MS")]
    pub capacity_wait_ms: Option<u64>,
    #[arg(long, env = "CAPACITY_POLL_MS")]
    pub capacity_poll_ms: Option<u64>,

    #[arg(long, env = "MAX_PENALTY")]
    pub max_penalty: Option<u32>,
    #[arg(long, env = "DECAY_MS")]
    pub decay_ms: Option<u64>,

    /// Number of communication rounds requested for this run (within the
    /// configured max); falls back to the profile default when unset.
    #[arg(long)]
    pub communication_rounds: Option<u32>,

    /// Number of failed-member retry rounds requested for this run.
    #[arg(long)]
    pub failed_member_retry_rounds: Option<u32>,

    /// How many members may be dispatched concurrently within this team.
    #[arg(long, default_value_t = 4)]
    pub member_parallelism: usize,
}

impl Args {
    /// Builds the effective [`RuntimeConfig`]: the stable or permissive
    /// preset, with any explicitly-set knob overridden.
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut config = if self.stable_runtime_profile {
            RuntimeConfig::stable_profile()
        } else {
            RuntimeConfig::permissive()
        };

        if let Some(v) = self.max_communication_rounds {
            config.max_communication_rounds = v;
        }
        if let Some(v) = self.default_communication_rounds {
            config.default_communication_rounds = v;
        }
        if let Some(v) = self.max_communication_partners {
            config.max_communication_partners = v;
        }
        if let Some(v) = self.max_failed_member_retry_rounds {
            config.max_failed_member_retry_rounds = v;
        }
        if let Some(v) = self.default_failed_member_retry_rounds {
            config.default_failed_member_retry_rounds = v;
        }
        if let Some(v) = self.default_agent_timeout_ms {
            config.default_agent_timeout_ms = v;
        }
        if let Some(v) = self.max_parallel_teams_per_run {
            config.max_parallel_teams_per_run = v;
        }
        if let Some(v) = self.max_parallel_teammates_per_team {
            config.max_parallel_teammates_per_team = v;
        }
        if let Some(v) = self.max_total_active_requests {
            config.max_total_active_requests = v;
        }
        if let Some(v) = self.max_total_active_llm {
            config.max_total_active_llm = v;
        }
        if let Some(v) = self.max_concurrent_orchestrations {
            config.max_concurrent_orchestrations = v;
        }
        if let Some(v) = self.capacity_wait_ms {
            config.capacity_wait_ms = v;
        }
        if let Some(v) = self.capacity_poll_ms {
            config.capacity_poll_ms = v;
        }
        if let Some(v) = self.max_penalty {
            config.max_penalty = v;
        }
        if let Some(v) = self.decay_ms {
            config.decay_ms = v;
        }

        config
    }

    /// Expands a leading `~` in the rate-limit state path against `$HOME`.
    pub fn rate_limit_state_path(&self) -> std::path::PathBuf {
        if let Some(rest) = self.rate_limit_state.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return std::path::PathBuf::from(home).join(rest);
            }
        }
        std::path::PathBuf::from(&self.rate_limit_state)
    }
}
