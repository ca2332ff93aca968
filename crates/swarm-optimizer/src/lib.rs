//! Swarm-intelligence optimization engine
//!
//! This crate runs population-based optimizers over bounded continuous
//! search spaces:
//! - Differential Evolution, Particle Swarm and the DEPSO hybrid
//! - Continuous Ant Colony, Genetic Algorithm, Grey Wolf and Whale optimizers
//!
//! Jobs are submitted to an [`OptimizationScheduler`], which runs each one on
//! its own task, streams per-generation snapshots and optionally folds the
//! outcome into an agent's experience profile.

#![warn(missing_docs)]

pub mod algorithms;
pub mod bounds;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod fitness;
pub mod job;
pub mod metrics;
pub mod objective;
pub mod population;
pub mod portfolio;
pub mod progression;
pub mod scheduler;
pub mod telemetry;

pub use algorithms::{AlgorithmConfig, AlgorithmKind, Optimizer, StrategyConfig};
pub use bounds::{BoundaryPolicy, Bounds};
pub use config::{EvaluationPolicy, SchedulerConfig};
pub use error::{FailureCause, FailureKind, OptimizerError, OptimizerResult};
pub use evaluator::{EvaluationStats, Evaluator};
pub use fitness::Fitness;
pub use job::{
    JobDescriptor, JobHandle, JobResult, JobSnapshot, JobStatus, StagnationPolicy,
    TerminationPolicy,
};
pub use metrics::RunMetrics;
pub use objective::{EvaluationError, FnObjective, ObjectiveFunction};
pub use population::{Candidate, Population};
pub use portfolio::PortfolioObjective;
pub use progression::{
    AgentProfile, ExperiencePolicy, InMemoryProfileStore, LevelUpEvent, ProfileStore,
    ProgressionTracker,
};
pub use scheduler::{OptimizationScheduler, ProgressStream};
pub use telemetry::{init_tracing, TracingConfig};

/// Initialize logging with defaults and build a scheduler
pub fn init(config: SchedulerConfig) -> OptimizerResult<OptimizationScheduler> {
    // A subscriber installed by the host application takes precedence
    if let Err(e) = init_tracing(TracingConfig::default()) {
        tracing::debug!(error = %e, "tracing already initialized");
    }
    tracing::info!("Initializing swarm optimizer");
    OptimizationScheduler::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init() {
        let scheduler = init(SchedulerConfig::default()).unwrap();
        assert!(scheduler.jobs().is_empty());
        // Second call must not fail on the already-installed subscriber
        assert!(init(SchedulerConfig::default()).is_ok());
    }
}
