//! Bandit-driven GraphQL API exploration.
//!
//! A Thompson sampler chooses, per operation, one of eight prompt strategies
//! ([`arms::ARMS`]). Each strategy's prompt goes to a [`TextGenerator`], the
//! returned queries run against the target, and the arm is rewarded when a
//! query succeeds while covering a field path no earlier query reached.
//!
//! [`run_exploration`] wraps a complete multi-round pass and writes the run's
//! artifacts. The host observes it through [`ExplorationObserver`].

pub mod arms;
pub mod bandit;
pub mod candidates;
pub mod engine;
pub mod error;
pub mod history;
pub mod observer;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod retrieval;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use arms::{Arm, ArgMode, ARMS};
pub use bandit::{BetaParams, ThompsonSampler};
pub use candidates::{extract_candidates, CandidateQuery};
pub use engine::{ExplorationState, Explorer, ExplorerConfig, ProgressWindow};
pub use error::{ExploreError, GenerateError};
pub use history::{ExecutionLog, ExecutionResult, FallbackProbe};
pub use observer::ExplorationObserver;
pub use pipeline::{run_exploration, ExplorationOutcome, ExplorationRequest};
pub use prompt::{build_prompt, OperationContext, Prompt};
pub use providers::{build_generator, ProviderConfig, ProviderKind, TextGenerator};
pub use report::{
    render_coverage_report, render_stats_table, CoverageReport, OperationCoverage, OperationStats,
    RoundStats, StatsTable,
};
pub use retrieval::{harvest_records, KnownValueIndex, KnownValueRecord, ScoredRecord, SimilarityIndex};
pub use target::{parse_headers_json, Execution, GraphQlTarget};
