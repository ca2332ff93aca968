//! Population-based optimization strategies
//!
//! Each strategy implements one generation-update rule behind the
//! [`Optimizer`] trait. Strategies are built from an [`AlgorithmConfig`],
//! which validates hyperparameters before anything runs.

pub mod aco;
pub mod de;
pub mod ga;
pub mod gwo;
pub mod hybrid;
pub mod pso;
pub mod woa;

use crate::bounds::{BoundaryPolicy, Bounds};
use crate::error::{OptimizerError, OptimizerResult};
use crate::evaluator::Evaluator;
use crate::population::Population;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

pub use aco::{AcoConfig, AntColonyOptimizer};
pub use de::{DeConfig, DeStrategy, DifferentialEvolution};
pub use ga::{CrossoverOperator, GaConfig, GeneticAlgorithm, SelectionOperator};
pub use gwo::{GreyWolfOptimizer, GwoConfig};
pub use hybrid::{DepsoConfig, DepsoOptimizer, HybridMode};
pub use pso::{ParticleSwarm, PsoConfig};
pub use woa::{WhaleOptimizer, WoaConfig};

/// Algorithm identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmKind {
    /// Differential Evolution
    DifferentialEvolution,
    /// Particle Swarm Optimization
    ParticleSwarm,
    /// Continuous Ant Colony Optimization
    AntColony,
    /// Genetic Algorithm
    Genetic,
    /// Grey Wolf Optimizer
    GreyWolf,
    /// Whale Optimization Algorithm
    Whale,
    /// DE/PSO hybrid
    Depso,
}

impl AlgorithmKind {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::DifferentialEvolution => "DE",
            AlgorithmKind::ParticleSwarm => "PSO",
            AlgorithmKind::AntColony => "ACO",
            AlgorithmKind::Genetic => "GA",
            AlgorithmKind::GreyWolf => "GWO",
            AlgorithmKind::Whale => "WOA",
            AlgorithmKind::Depso => "DEPSO",
        }
    }

    /// Smallest population the update rule is defined for
    pub fn min_population(&self) -> usize {
        match self {
            AlgorithmKind::DifferentialEvolution | AlgorithmKind::Depso => 4,
            AlgorithmKind::GreyWolf => 3,
            AlgorithmKind::ParticleSwarm
            | AlgorithmKind::AntColony
            | AlgorithmKind::Genetic
            | AlgorithmKind::Whale => 2,
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hyperparameter set of one strategy
pub trait StrategyConfig: fmt::Debug + Send + Sync {
    /// Check every hyperparameter against its documented range
    fn validate(&self, population_size: usize) -> OptimizerResult<()>;

    /// Algorithm the parameters belong to
    fn kind(&self) -> AlgorithmKind;
}

/// Everything a strategy may use during one step besides the population
pub struct StepContext<'a> {
    /// The job's seeded generator; the only source of randomness
    pub rng: &'a mut StdRng,
    /// Evaluator for strategies that evaluate internally
    pub evaluator: &'a Evaluator,
    /// Search space
    pub bounds: &'a Bounds,
    /// How out-of-range coordinates are repaired
    pub boundary: BoundaryPolicy,
    /// Generation being stepped from
    pub generation: u64,
    /// Generation budget of the job
    pub max_generations: u64,
}

impl StepContext<'_> {
    /// Fraction of the generation budget used, in `[0, 1]`
    pub fn progress(&self) -> f64 {
        if self.max_generations == 0 {
            return 1.0;
        }
        (self.generation as f64 / self.max_generations as f64).clamp(0.0, 1.0)
    }

    /// Repair a position in place
    pub fn enforce_bounds(&self, position: &mut [f64]) {
        self.bounds.enforce(self.boundary, position);
    }
}

/// One generation-update rule
#[async_trait]
pub trait Optimizer: Send {
    /// Which algorithm this is
    fn kind(&self) -> AlgorithmKind;

    /// Produce the next generation from an evaluated population.
    ///
    /// New candidates are returned unevaluated unless the rule needs their
    /// fitness for its own selection.
    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population>;
}

/// Tagged algorithm choice with its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "params", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    /// Differential Evolution
    DifferentialEvolution(DeConfig),
    /// Particle Swarm Optimization
    ParticleSwarm(PsoConfig),
    /// Continuous Ant Colony Optimization
    AntColony(AcoConfig),
    /// Genetic Algorithm
    Genetic(GaConfig),
    /// Grey Wolf Optimizer
    GreyWolf(GwoConfig),
    /// Whale Optimization Algorithm
    Whale(WoaConfig),
    /// DE/PSO hybrid
    Depso(DepsoConfig),
}

impl AlgorithmConfig {
    fn params(&self) -> &dyn StrategyConfig {
        match self {
            AlgorithmConfig::DifferentialEvolution(c) => c,
            AlgorithmConfig::ParticleSwarm(c) => c,
            AlgorithmConfig::AntColony(c) => c,
            AlgorithmConfig::Genetic(c) => c,
            AlgorithmConfig::GreyWolf(c) => c,
            AlgorithmConfig::Whale(c) => c,
            AlgorithmConfig::Depso(c) => c,
        }
    }

    /// Algorithm identifier
    pub fn kind(&self) -> AlgorithmKind {
        self.params().kind()
    }

    /// Validate hyperparameters and the population size minimum
    pub fn validate(&self, population_size: usize) -> OptimizerResult<()> {
        let kind = self.kind();
        if population_size < kind.min_population() {
            return Err(OptimizerError::invalid_descriptor(format!(
                "{} requires a population of at least {}, got {}",
                kind,
                kind.min_population(),
                population_size
            )));
        }
        self.params().validate(population_size)
    }

    /// Validate and instantiate the strategy
    pub fn build(&self, population_size: usize) -> OptimizerResult<Box<dyn Optimizer>> {
        self.validate(population_size)?;
        let optimizer: Box<dyn Optimizer> = match self {
            AlgorithmConfig::DifferentialEvolution(c) => Box::new(DifferentialEvolution::new(c.clone())?),
            AlgorithmConfig::ParticleSwarm(c) => Box::new(ParticleSwarm::new(c.clone())?),
            AlgorithmConfig::AntColony(c) => Box::new(AntColonyOptimizer::new(c.clone(), population_size)?),
            AlgorithmConfig::Genetic(c) => Box::new(GeneticAlgorithm::new(c.clone(), population_size)?),
            AlgorithmConfig::GreyWolf(c) => Box::new(GreyWolfOptimizer::new(c.clone())?),
            AlgorithmConfig::Whale(c) => Box::new(WhaleOptimizer::new(c.clone())?),
            AlgorithmConfig::Depso(c) => Box::new(DepsoOptimizer::new(c.clone(), population_size)?),
        };
        Ok(optimizer)
    }
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::DifferentialEvolution(DeConfig::default())
    }
}

/// Reject `value` unless it lies in `range`
pub(crate) fn ensure_in_range(
    kind: AlgorithmKind,
    name: &str,
    value: f64,
    range: RangeInclusive<f64>,
) -> OptimizerResult<()> {
    if !range.contains(&value) {
        return Err(OptimizerError::invalid_hyperparameter(
            kind.name(),
            name,
            value,
            format!("must be in [{}, {}]", range.start(), range.end()),
        ));
    }
    Ok(())
}

/// Reject `value` unless it lies in the half-open range `(low, high]`
pub(crate) fn ensure_in_open_closed(
    kind: AlgorithmKind,
    name: &str,
    value: f64,
    low: f64,
    high: f64,
) -> OptimizerResult<()> {
    if !(value > low && value <= high) {
        return Err(OptimizerError::invalid_hyperparameter(
            kind.name(),
            name,
            value,
            format!("must be in ({low}, {high}]"),
        ));
    }
    Ok(())
}

/// `count` distinct indices from `0..n`, none equal to `exclude`
pub(crate) fn distinct_indices<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    exclude: usize,
    count: usize,
) -> Vec<usize> {
    let mut chosen = Vec::with_capacity(count);
    while chosen.len() < count {
        let idx = rng.gen_range(0..n);
        if idx != exclude && !chosen.contains(&idx) {
            chosen.push(idx);
        }
    }
    chosen
}

/// Position of the best-so-far candidate, falling back to this generation's best
pub(crate) fn leader_position(population: &Population) -> OptimizerResult<Vec<f64>> {
    population
        .best()
        .or_else(|| population.generation_best())
        .map(|c| c.position().to_vec())
        .ok_or_else(|| OptimizerError::EvaluationFailed {
            reason: "population has no evaluated candidate to follow".to_string(),
        })
}
