//! Grey Wolf Optimizer

use super::{ensure_in_open_closed, AlgorithmKind, Optimizer, StepContext, StrategyConfig};
use crate::error::{OptimizerError, OptimizerResult};
use crate::fitness::compare_optional;
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// GWO hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GwoConfig {
    /// Starting value of the exploration coefficient `a`, decayed linearly to 0, in (0, 4]
    pub initial_a: f64,
}

impl Default for GwoConfig {
    fn default() -> Self {
        Self { initial_a: 2.0 }
    }
}

impl StrategyConfig for GwoConfig {
    fn validate(&self, _population_size: usize) -> OptimizerResult<()> {
        ensure_in_open_closed(self.kind(), "initial_a", self.initial_a, 0.0, 4.0)
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::GreyWolf
    }
}

/// Grey Wolf strategy
#[derive(Debug, Clone)]
pub struct GreyWolfOptimizer {
    config: GwoConfig,
}

impl GreyWolfOptimizer {
    /// Create the strategy
    pub fn new(config: GwoConfig) -> OptimizerResult<Self> {
        config.validate(AlgorithmKind::GreyWolf.min_population())?;
        Ok(Self { config })
    }

    /// Exploration coefficient at the given run progress
    pub fn coefficient_at(&self, progress: f64) -> f64 {
        self.config.initial_a * (1.0 - progress)
    }
}

/// Alpha, beta and delta: the three best distinct wolves, best-so-far included
fn leaders(population: &Population) -> Vec<Vec<f64>> {
    let mut pool: Vec<&Candidate> = population.best().into_iter().collect();
    pool.extend(population.select_top(3));
    pool.sort_by(|a, b| compare_optional(a.fitness(), b.fitness()));

    let mut picked: Vec<Vec<f64>> = Vec::with_capacity(3);
    for candidate in pool {
        if picked.len() == 3 {
            break;
        }
        if !picked.iter().any(|p| p.as_slice() == candidate.position()) {
            picked.push(candidate.position().to_vec());
        }
    }
    picked
}

#[async_trait]
impl Optimizer for GreyWolfOptimizer {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::GreyWolf
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        let leaders = leaders(&population);
        if leaders.is_empty() {
            return Err(OptimizerError::EvaluationFailed {
                reason: "no evaluated wolves to lead the pack".to_string(),
            });
        }
        let a = self.coefficient_at(ctx.progress());

        let mut next = Vec::with_capacity(population.size());
        for wolf in population.candidates() {
            let x = wolf.position();
            let mut position = Vec::with_capacity(x.len());
            for dim in 0..x.len() {
                let mut pulled = 0.0;
                for leader in &leaders {
                    let big_a = 2.0 * a * ctx.rng.gen::<f64>() - a;
                    let c = 2.0 * ctx.rng.gen::<f64>();
                    let distance = (c * leader[dim] - x[dim]).abs();
                    pulled += leader[dim] - big_a * distance;
                }
                position.push(pulled / leaders.len() as f64);
            }
            ctx.enforce_bounds(&mut position);
            next.push(Candidate::new(position));
        }

        Ok(population.with_candidates(next))
    }
}
