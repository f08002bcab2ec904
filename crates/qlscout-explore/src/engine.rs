//! The bandit-driven exploration loop.
//!
//! # Inner loop
//!
//! For each operation, every iteration:
//! 1. polls the observer for cancellation,
//! 2. lets the [`ThompsonSampler`] pick an arm (escalating its known-value
//!    count after repeated failures of a schema-including arm),
//! 3. builds the prompt and asks the [`TextGenerator`] for candidates,
//! 4. executes candidates against the target while budget remains,
//! 5. rewards the arm with 1.0 iff some candidate succeeded *and* selected a
//!    field path never covered before.
//!
//! The loop ends when the operation is covered this round or when its
//! cumulative request budget (`requests_per_node * round`) is spent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use qlscout_core::{CoverageTracker, OperationDef, SchemaGraph};
use tracing::{debug, info, warn};

use crate::arms::{self, Arm};
use crate::bandit::ThompsonSampler;
use crate::candidates::extract_candidates;
use crate::error::ExploreError;
use crate::history::{ExecutionLog, ExecutionResult};
use crate::observer::ExplorationObserver;
use crate::prompt::{build_prompt, OperationContext};
use crate::providers::TextGenerator;
use crate::report::{OperationStats, RoundStats};
use crate::retrieval::{harvest_records, SimilarityIndex};
use crate::target::GraphQlTarget;

/// Engine tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerConfig {
    /// Bandit discount factor in `(0, 1]`.
    pub gamma: f64,
    /// Consecutive zero-reward iterations before schema arms escalate.
    pub escalation_threshold: u32,
    pub escalated_top_k: usize,
    /// Minimum number of known values prefetched per operation.
    pub prefetch_top_k: usize,
    /// Fenced blocks examined per model response.
    pub max_blocks: usize,
    /// Liveness probe sent after an empty response body.
    pub fallback_query: String,
    /// Previous exchanges quoted in each prompt.
    pub history_limit: usize,
    /// Characters of each quoted response body.
    pub history_body_limit: usize,
    pub request_timeout: Duration,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        ExplorerConfig {
            gamma: 1.0,
            escalation_threshold: 2,
            escalated_top_k: 5,
            prefetch_top_k: 5,
            max_blocks: 10,
            fallback_query: "query { __typename }".to_string(),
            history_limit: 5,
            history_body_limit: 400,
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl ExplorerConfig {
    /// Known values offered to `arm` after `fail_streak` consecutive misses.
    pub fn effective_top_k(&self, arm: &Arm, fail_streak: u32) -> usize {
        if arm.include_schema && fail_streak >= self.escalation_threshold {
            arm.top_k.max(self.escalated_top_k)
        } else {
            arm.top_k
        }
    }
}

/// Everything one run learns, owned by that run.
#[derive(Debug)]
pub struct ExplorationState {
    pub bandit: ThompsonSampler,
    pub coverage: CoverageTracker,
    pub history: ExecutionLog,
    requests: HashMap<String, u32>,
}

impl ExplorationState {
    pub fn new(bandit: ThompsonSampler, coverage: CoverageTracker, history: ExecutionLog) -> Self {
        ExplorationState {
            bandit,
            coverage,
            history,
            requests: HashMap::new(),
        }
    }

    /// Fresh state that never touches the filesystem.
    pub fn in_memory(seed: Option<u64>, gamma: f64) -> Self {
        Self::new(
            ThompsonSampler::new(seed, gamma),
            CoverageTracker::in_memory(),
            ExecutionLog::in_memory(),
        )
    }

    /// Requests charged to `op` across all rounds so far.
    pub fn requests(&self, op: &str) -> u32 {
        self.requests.get(op).copied().unwrap_or(0)
    }

    fn charge(&mut self, op: &str) {
        *self.requests.entry(op.to_string()).or_insert(0) += 1;
    }
}

/// A slice of the overall progress bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    pub start: f64,
    pub width: f64,
}

impl ProgressWindow {
    pub fn new(start: f64, width: f64) -> Self {
        ProgressWindow { start, width }
    }

    pub fn at(&self, fraction: f64) -> f64 {
        (self.start + self.width * fraction.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }

    /// The `index`-th of `parts` equal sub-windows.
    pub fn split(&self, index: usize, parts: usize) -> ProgressWindow {
        let parts = parts.max(1) as f64;
        let width = self.width / parts;
        ProgressWindow {
            start: self.start + width * index as f64,
            width,
        }
    }
}

/// Drives rounds of exploration against one target.
pub struct Explorer {
    config: ExplorerConfig,
    target: GraphQlTarget,
    generator: Arc<dyn TextGenerator>,
    index: Arc<dyn SimilarityIndex>,
    observer: Arc<dyn ExplorationObserver>,
}

impl Explorer {
    pub fn new(
        config: ExplorerConfig,
        target: GraphQlTarget,
        generator: Arc<dyn TextGenerator>,
        index: Arc<dyn SimilarityIndex>,
        observer: Arc<dyn ExplorationObserver>,
    ) -> Self {
        Explorer {
            config,
            target,
            generator,
            index,
            observer,
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn target(&self) -> &GraphQlTarget {
        &self.target
    }

    /// Explores every operation once with the round's cumulative budget.
    pub async fn run_round(
        &self,
        graph: &SchemaGraph,
        state: &mut ExplorationState,
        round: u32,
        requests_per_node: u32,
        window: ProgressWindow,
    ) -> Result<RoundStats, ExploreError> {
        self.ensure_not_cancelled().await?;
        let budget = requests_per_node.saturating_mul(round);
        info!(round, budget, operations = graph.operations.len(), "starting round");
        self.observer
            .log(format!(
                "Round {round}: up to {budget} requests per operation across {} operations",
                graph.operations.len()
            ))
            .await;

        let total = graph.operations.len();
        let mut stats = RoundStats::new();
        for (i, op) in graph.operations.values().enumerate() {
            let op_stats = self
                .explore_operation(op, state, round, budget, window.split(i, total))
                .await?;
            stats.insert(op.name.clone(), op_stats);
        }
        Ok(stats)
    }

    /// Runs the inner loop for one operation until it is covered this round
    /// or `budget` cumulative requests are spent.
    pub async fn explore_operation(
        &self,
        op: &OperationDef,
        state: &mut ExplorationState,
        round: u32,
        budget: u32,
        window: ProgressWindow,
    ) -> Result<OperationStats, ExploreError> {
        self.ensure_not_cancelled().await?;

        let starting = state.requests(&op.name);
        let mut stats = OperationStats {
            requests: starting,
            ..OperationStats::default()
        };
        if starting >= budget {
            debug!(operation = %op.name, budget, "budget already spent");
            return Ok(stats);
        }

        let known_values = self.prefetch_known_values(op).await;
        let allowance = f64::from(budget - starting);
        let mut fail_streak = 0u32;

        loop {
            self.ensure_not_cancelled().await?;
            let spent = state.requests(&op.name);
            if spent >= budget {
                self.observer
                    .log(format!("[{}] budget of {budget} requests spent", op.name))
                    .await;
                break;
            }
            let fraction = f64::from(spent - starting) / allowance;

            let arm = state.bandit.select(&op.name);
            let top_k = self.config.effective_top_k(arm, fail_streak);
            let prompt = {
                let history = state.history.recent(&op.name, self.config.history_limit);
                let context = OperationContext::assemble(
                    op,
                    arm,
                    &known_values,
                    top_k,
                    history,
                    self.config.history_body_limit,
                );
                build_prompt(arm, &context)
            };
            stats.token_estimate += prompt.token_estimate;

            self.observer
                .progress(
                    window.at(fraction),
                    "generating_candidates",
                    Some(format!("{} via {}", op.name, arm.name)),
                )
                .await;
            let candidates = match self.generator.generate(&prompt.text).await {
                Ok(response) => {
                    extract_candidates(&response, &op.name, arm.name, self.config.max_blocks)
                }
                Err(err) => {
                    warn!(operation = %op.name, arm = arm.name, error = %err, "generation failed");
                    self.observer
                        .log(format!("[{}] generation failed: {err}", op.name))
                        .await;
                    Vec::new()
                }
            };
            self.observer
                .log(format!(
                    "[{}] arm {} (top_k {top_k}) produced {} candidate(s)",
                    op.name,
                    arm.name,
                    candidates.len()
                ))
                .await;

            let mut reward = 0.0;
            if candidates.is_empty() {
                state.charge(&op.name);
            } else {
                self.observer
                    .progress(
                        window.at(fraction),
                        "executing_candidates",
                        Some(format!("{}: {} candidate(s)", op.name, candidates.len())),
                    )
                    .await;
            }

            for candidate in candidates {
                if state.requests(&op.name) >= budget {
                    break;
                }
                let execution = self.target.execute(&candidate.text).await;
                state.charge(&op.name);

                let result = ExecutionResult::new(&candidate.text, arm.name, round, execution);
                let status = result.http_status;
                let mut new_coverage = false;
                if result.success {
                    stats.succeeded = true;
                    new_coverage = match state.coverage.compute_delta(&op.name, &candidate.text) {
                        Ok(delta) => delta,
                        Err(err) => {
                            warn!(operation = %op.name, error = %err, "coverage store write failed");
                            true
                        }
                    };
                    if new_coverage {
                        reward = 1.0;
                    }
                }
                let success = result.success;
                if let Err(err) = state.history.record(&op.name, result) {
                    warn!(operation = %op.name, error = %err, "execution history write failed");
                }

                let status = status.map_or_else(|| "none".to_string(), |s| s.to_string());
                self.observer
                    .log(format!(
                        "[{}] #{} status={status} success={success} new_coverage={new_coverage}",
                        op.name,
                        state.requests(&op.name)
                    ))
                    .await;
            }

            state.bandit.update(&op.name, arm.name, reward);
            stats.requests = state.requests(&op.name);

            if reward >= 1.0 {
                self.observer
                    .log(format!("[{}] covered with arm {}", op.name, arm.name))
                    .await;
                break;
            }
            fail_streak += 1;
        }

        Ok(stats)
    }

    /// Rebuilds the similarity index from every successful execution so far.
    /// Returns the number of records offered to the index.
    pub async fn refresh_index(&self, graph: &SchemaGraph, history: &ExecutionLog) -> usize {
        let records = harvest_records(graph, history);
        let count = records.len();
        match self.index.refresh(records).await {
            Ok(()) => {
                debug!(records = count, "known-value index refreshed");
                count
            }
            Err(err) => {
                warn!(error = %err, "known-value index refresh failed");
                0
            }
        }
    }

    async fn prefetch_known_values(&self, op: &OperationDef) -> Vec<String> {
        let inputs = serde_json::to_string(&op.input_signatures).unwrap_or_default();
        let query = format!("{}, input: {inputs}", op.name);
        let top_k = arms::max_top_k().max(self.config.prefetch_top_k);
        match self.index.search(&query, top_k).await {
            Ok(hits) => hits.into_iter().map(|hit| hit.record.text).collect(),
            Err(err) => {
                warn!(operation = %op.name, error = %err, "known-value lookup failed");
                Vec::new()
            }
        }
    }

    async fn ensure_not_cancelled(&self) -> Result<(), ExploreError> {
        if self.observer.is_cancelled().await {
            Err(ExploreError::Cancelled)
        } else {
            Ok(())
        }
    }
}
