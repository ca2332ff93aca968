//! Job descriptors, states and results

use crate::algorithms::{AlgorithmConfig, AlgorithmKind};
use crate::bounds::{BoundaryPolicy, Bounds};
use crate::config::EvaluationPolicy;
use crate::error::{FailureCause, OptimizerError, OptimizerResult};
use crate::evaluator::EvaluationStats;
use crate::fitness::Fitness;
use crate::metrics::RunMetrics;
use crate::objective::ObjectiveFunction;
use crate::population::Candidate;
use crate::progression::LevelUpEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Opaque reference to a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    id: Uuid,
}

impl JobHandle {
    pub(crate) fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Job identifier
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// Stagnation rule: stop after `window` generations without an improvement larger than `tolerance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StagnationPolicy {
    /// Consecutive non-improving generations tolerated
    pub window: u64,
    /// Improvements at or below this are not counted
    pub tolerance: f64,
}

/// When a job stops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationPolicy {
    /// Generations to evaluate at most
    pub max_generations: u64,
    /// Stop once the best primary fitness is at or below this
    pub target_fitness: Option<f64>,
    /// Optional stagnation rule
    pub stagnation: Option<StagnationPolicy>,
    /// Optional wall-clock budget
    pub max_runtime: Option<Duration>,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            max_generations: 100,
            target_fitness: None,
            stagnation: None,
            max_runtime: None,
        }
    }
}

impl TerminationPolicy {
    /// Validate the policy
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.max_generations == 0 {
            return Err(OptimizerError::invalid_descriptor(
                "max_generations must be greater than 0",
            ));
        }

        if let Some(target) = self.target_fitness {
            if !target.is_finite() {
                return Err(OptimizerError::invalid_descriptor(format!(
                    "target fitness must be finite, got {target}"
                )));
            }
        }

        if let Some(stagnation) = self.stagnation {
            if stagnation.window == 0 {
                return Err(OptimizerError::invalid_descriptor(
                    "stagnation window must be greater than 0",
                ));
            }
            if !(stagnation.tolerance >= 0.0 && stagnation.tolerance.is_finite()) {
                return Err(OptimizerError::invalid_descriptor(format!(
                    "stagnation tolerance must be finite and non-negative, got {}",
                    stagnation.tolerance
                )));
            }
        }

        if self.max_runtime == Some(Duration::ZERO) {
            return Err(OptimizerError::invalid_descriptor(
                "max runtime must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Terminal status for the generation just evaluated, if any.
    ///
    /// Checked in order: cancellation, target, stagnation, generation budget, time budget.
    pub fn check(
        &self,
        tracker: &ConvergenceTracker,
        cancelled: bool,
        elapsed: Duration,
    ) -> Option<JobStatus> {
        if cancelled {
            return Some(JobStatus::Cancelled);
        }

        if let (Some(target), Some(best)) = (self.target_fitness, tracker.best()) {
            if best <= target {
                return Some(JobStatus::Converged);
            }
        }

        if let Some(stagnation) = self.stagnation {
            if tracker.stagnant_generations() >= stagnation.window {
                return Some(JobStatus::Stagnated);
            }
        }

        if tracker.generations() >= self.max_generations {
            return Some(JobStatus::MaxGenerationsReached);
        }

        match self.max_runtime {
            Some(limit) if elapsed >= limit => Some(JobStatus::TimeLimitReached),
            _ => None,
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Submitted, waiting for a run slot
    Created,
    /// Generation loop active
    Running,
    /// Target fitness reached
    Converged,
    /// Generation budget exhausted
    MaxGenerationsReached,
    /// No significant improvement within the stagnation window
    Stagnated,
    /// Wall-clock budget exhausted
    TimeLimitReached,
    /// Stopped on request
    Cancelled,
    /// Stopped by a run-time error
    Failed(FailureCause),
}

impl JobStatus {
    /// Whether the job has finished
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Created | JobStatus::Running)
    }

    /// Whether the job finished without error or cancellation
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobStatus::Converged
                | JobStatus::MaxGenerationsReached
                | JobStatus::Stagnated
                | JobStatus::TimeLimitReached
        )
    }
}

/// Immutable description of one optimization job
#[derive(Clone)]
pub struct JobDescriptor {
    algorithm: AlgorithmConfig,
    objective: Arc<dyn ObjectiveFunction>,
    bounds: Bounds,
    population_size: usize,
    termination: TerminationPolicy,
    seed: u64,
    evaluation: Option<EvaluationPolicy>,
    boundary: BoundaryPolicy,
    agent_id: Option<String>,
}

impl fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("algorithm", &self.algorithm)
            .field("objective", &self.objective.name())
            .field("bounds", &self.bounds)
            .field("population_size", &self.population_size)
            .field("termination", &self.termination)
            .field("seed", &self.seed)
            .field("evaluation", &self.evaluation)
            .field("boundary", &self.boundary)
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

impl JobDescriptor {
    /// Start a descriptor for the given objective
    pub fn builder(objective: Arc<dyn ObjectiveFunction>) -> JobDescriptorBuilder {
        JobDescriptorBuilder::new(objective)
    }

    /// Algorithm and hyperparameters
    pub fn algorithm(&self) -> &AlgorithmConfig {
        &self.algorithm
    }

    /// Objective being minimised
    pub fn objective(&self) -> &Arc<dyn ObjectiveFunction> {
        &self.objective
    }

    /// Search space
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Dimensionality
    pub fn dimensions(&self) -> usize {
        self.bounds.dimensions()
    }

    /// Candidates per generation
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// Termination rules
    pub fn termination(&self) -> &TerminationPolicy {
        &self.termination
    }

    /// Seed of the job's generator
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Evaluation override, `None` uses the scheduler default
    pub fn evaluation(&self) -> Option<&EvaluationPolicy> {
        self.evaluation.as_ref()
    }

    /// Boundary repair policy
    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    /// Agent credited with the outcome
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    /// Full descriptor validation
    pub fn validate(&self) -> OptimizerResult<()> {
        let declared = self.objective.dimensions();
        if self.bounds.dimensions() != declared {
            return Err(OptimizerError::invalid_descriptor(format!(
                "bounds have {} dimensions but objective '{}' declares {}",
                self.bounds.dimensions(),
                self.objective.name(),
                declared
            )));
        }

        self.termination.validate()?;

        if let Some(policy) = &self.evaluation {
            policy
                .validate()
                .map_err(|e| OptimizerError::invalid_descriptor(e.to_string()))?;
        }

        if let Some(agent) = &self.agent_id {
            if agent.trim().is_empty() {
                return Err(OptimizerError::invalid_descriptor("agent id must not be empty"));
            }
        }

        self.algorithm
            .validate(self.population_size)
            .map_err(|e| match e {
                OptimizerError::InvalidDescriptor { .. } => e,
                other => OptimizerError::invalid_descriptor(other.to_string()),
            })
    }
}

/// Builder for JobDescriptor
pub struct JobDescriptorBuilder {
    algorithm: AlgorithmConfig,
    objective: Arc<dyn ObjectiveFunction>,
    bounds: Option<Bounds>,
    population_size: usize,
    termination: TerminationPolicy,
    seed: Option<u64>,
    evaluation: Option<EvaluationPolicy>,
    boundary: BoundaryPolicy,
    agent_id: Option<String>,
}

impl JobDescriptorBuilder {
    fn new(objective: Arc<dyn ObjectiveFunction>) -> Self {
        Self {
            algorithm: AlgorithmConfig::default(),
            objective,
            bounds: None,
            population_size: 30,
            termination: TerminationPolicy::default(),
            seed: None,
            evaluation: None,
            boundary: BoundaryPolicy::default(),
            agent_id: None,
        }
    }

    /// Set the algorithm
    pub fn algorithm(mut self, algorithm: AlgorithmConfig) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Override the objective's declared bounds
    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Set population size
    pub fn population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    /// Set max generations
    pub fn max_generations(mut self, generations: u64) -> Self {
        self.termination.max_generations = generations;
        self
    }

    /// Set target fitness
    pub fn target_fitness(mut self, fitness: f64) -> Self {
        self.termination.target_fitness = Some(fitness);
        self
    }

    /// Set the stagnation rule
    pub fn stagnation(mut self, window: u64, tolerance: f64) -> Self {
        self.termination.stagnation = Some(StagnationPolicy { window, tolerance });
        self
    }

    /// Set max runtime
    pub fn max_runtime(mut self, limit: Duration) -> Self {
        self.termination.max_runtime = Some(limit);
        self
    }

    /// Replace the whole termination policy
    pub fn termination(mut self, termination: TerminationPolicy) -> Self {
        self.termination = termination;
        self
    }

    /// Set seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the scheduler's evaluation policy
    pub fn evaluation(mut self, policy: EvaluationPolicy) -> Self {
        self.evaluation = Some(policy);
        self
    }

    /// Set the boundary repair policy
    pub fn boundary(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary = policy;
        self
    }

    /// Credit the outcome to an agent
    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Build and validate the descriptor
    pub fn build(self) -> OptimizerResult<JobDescriptor> {
        let bounds = self
            .bounds
            .unwrap_or_else(|| self.objective.bounds().clone());
        let descriptor = JobDescriptor {
            algorithm: self.algorithm,
            objective: self.objective,
            bounds,
            population_size: self.population_size,
            termination: self.termination,
            seed: self.seed.unwrap_or_else(rand::random),
            evaluation: self.evaluation,
            boundary: self.boundary,
            agent_id: self.agent_id,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Tracks best-so-far history and stagnation across generations
#[derive(Debug, Clone, Default)]
pub struct ConvergenceTracker {
    history: Vec<f64>,
    reference: Option<f64>,
    stagnant: u64,
    tolerance: f64,
}

impl ConvergenceTracker {
    /// Tracker counting only improvements larger than `tolerance`
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }

    /// Record the best-so-far primary fitness after a generation
    pub fn record(&mut self, best: f64) {
        self.history.push(best);
        match self.reference {
            Some(reference) if reference - best > self.tolerance => {
                self.reference = Some(best);
                self.stagnant = 0;
            }
            Some(_) => self.stagnant += 1,
            None => self.reference = Some(best),
        }
    }

    /// Evaluated generations so far
    pub fn generations(&self) -> u64 {
        self.history.len() as u64
    }

    /// Latest best-so-far
    pub fn best(&self) -> Option<f64> {
        self.history.last().copied()
    }

    /// Best-so-far of the first generation
    pub fn initial(&self) -> Option<f64> {
        self.history.first().copied()
    }

    /// Consecutive generations without significant improvement
    pub fn stagnant_generations(&self) -> u64 {
        self.stagnant
    }

    /// Best-so-far per generation
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub(crate) fn into_history(self) -> Vec<f64> {
        self.history
    }
}

/// Point-in-time view of a job, emitted at generation boundaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier
    pub job_id: Uuid,
    /// Lifecycle state
    pub status: JobStatus,
    /// Evaluated generations
    pub generation: u64,
    /// Best fitness so far
    pub best_fitness: Option<Fitness>,
    /// Evaluation attempts so far
    pub evaluations: u64,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Level-ups earned by the job's agent (terminal snapshot only)
    pub level_ups: Vec<LevelUpEvent>,
}

impl JobSnapshot {
    pub(crate) fn created(handle: JobHandle) -> Self {
        Self {
            job_id: handle.id(),
            status: JobStatus::Created,
            generation: 0,
            best_fitness: None,
            evaluations: 0,
            timestamp: Utc::now(),
            level_ups: Vec::new(),
        }
    }
}

/// Outcome of a terminal job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Job identifier
    pub job_id: Uuid,
    /// Algorithm that ran
    pub algorithm: AlgorithmKind,
    /// Objective name
    pub objective: String,
    /// Terminal state
    pub termination: JobStatus,
    /// Best candidate found; `None` only if no generation was ever evaluated
    pub best: Option<Candidate>,
    /// Best-so-far primary fitness per generation
    pub history: Vec<f64>,
    /// Last fully evaluated generation; empty only if none was evaluated
    pub final_population: Vec<Candidate>,
    /// Evaluated generations
    pub generations: u64,
    /// Configured population size
    pub population_size: usize,
    /// Problem dimensionality
    pub dimensions: usize,
    /// Seed the job ran with
    pub seed: u64,
    /// Agent credited with the outcome
    pub agent_id: Option<String>,
    /// Per-generation metrics
    pub metrics: RunMetrics,
    /// Evaluation counters
    pub evaluation_stats: EvaluationStats,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    /// Best-so-far primary fitness after the first generation
    pub fn initial_best_fitness(&self) -> Option<f64> {
        self.history.first().copied()
    }

    /// Final best primary fitness
    pub fn best_fitness(&self) -> Option<f64> {
        self.best.as_ref().map(Candidate::primary_fitness)
    }
}
