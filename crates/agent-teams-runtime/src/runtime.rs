//! The `Runtime` facade (§9 "global singletons" redesign note): bundles the
//! admission controller, rate-limit gate, adaptive penalty, and config that
//! would otherwise live as process-wide statics, so a caller can construct
//! (and, in tests, isolate) one runtime per process or per test.

use std::sync::Arc;

use crate::admission::{AcquireOutcome, AdmissionController};
use crate::cancel::CancelToken;
use crate::config::RuntimeConfig;
use crate::member_executor::MemberExecutor;
use crate::observer::ObserverSet;
use crate::orchestrator::{self, ParallelRunResult, ParallelTeamSpec, RunTeamOutcome, RunTeamRequest, TeamRuntimeDeps};
use crate::penalty::AdaptivePenalty;
use crate::rate_limit::SharedGate;
use crate::retry::RetryOptions;

pub struct Runtime {
    pub config: RuntimeConfig,
    pub admission: AdmissionController,
    pub penalty: AdaptivePenalty,
    gate: Arc<dyn SharedGate>,
    executor: Arc<dyn MemberExecutor>,
    observer: ObserverSet,
    retry_options: RetryOptions,
}

impl Runtime {
    pub fn new(
        config: RuntimeConfig,
        executor: Arc<dyn MemberExecutor>,
        gate: Arc<dyn SharedGate>,
        observer: ObserverSet,
    ) -> Self {
        let admission = AdmissionController::new(&config);
        let penalty = AdaptivePenalty::new(config.max_penalty, config.decay_ms);
        Self {
            admission,
            penalty,
            retry_options: RetryOptions::default(),
            config,
            executor,
            gate,
            observer,
        }
    }

    /// Overrides the default retry policy applied to every member dispatch.
    pub fn with_retry_options(mut self, retry_options: RetryOptions) -> Self {
        self.retry_options = retry_options;
        self
    }

    fn deps(&self) -> Arc<TeamRuntimeDeps> {
        Arc::new(TeamRuntimeDeps {
            executor: self.executor.clone(),
            gate: self.gate.clone(),
            observer: self.observer.clone(),
            retry_options: self.retry_options.clone(),
        })
    }

    /// Admits the caller into the shared orchestration queue (§4.3).
    pub async fn acquire_orchestration_turn(&self, max_wait_ms: u64, cancel: &CancelToken) -> AcquireOutcome {
        self.admission.acquire_orchestration_turn(max_wait_ms, cancel).await
    }

    /// Runs a single team through the full phase sequence (§4.1).
    pub async fn run_team(&self, request: RunTeamRequest, cancel: CancelToken) -> RunTeamOutcome {
        orchestrator::run_team(self.deps(), request, &self.config, cancel).await
    }

    /// Runs a batch of teams under shared capacity and the adaptive penalty (§4.2).
    pub async fn run_teams_parallel(
        &self,
        specs: Vec<ParallelTeamSpec>,
        requested_team_parallelism: usize,
        requested_member_parallelism: usize,
        cancel: CancelToken,
    ) -> ParallelRunResult {
        orchestrator::run_teams_parallel(
            self.deps(),
            &self.admission,
            &self.penalty,
            &self.config,
            specs,
            requested_team_parallelism,
            requested_member_parallelism,
            cancel,
        )
        .await
    }
}
