//! Whale Optimization Algorithm

use super::{ensure_in_open_closed, ensure_in_range, leader_position, AlgorithmKind, Optimizer, StepContext, StrategyConfig};
use crate::error::OptimizerResult;
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// WOA hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WoaConfig {
    /// Starting value of `a`, decayed linearly to 0, in (0, 4]
    pub initial_a: f64,
    /// Logarithmic spiral shape constant b, in (0, 10]
    pub spiral_constant: f64,
    /// Probability of the spiral move instead of encircling, in [0, 1]
    pub spiral_probability: f64,
}

impl Default for WoaConfig {
    fn default() -> Self {
        Self {
            initial_a: 2.0,
            spiral_constant: 1.0,
            spiral_probability: 0.5,
        }
    }
}

impl StrategyConfig for WoaConfig {
    fn validate(&self, _population_size: usize) -> OptimizerResult<()> {
        let kind = self.kind();
        ensure_in_open_closed(kind, "initial_a", self.initial_a, 0.0, 4.0)?;
        ensure_in_open_closed(kind, "spiral_constant", self.spiral_constant, 0.0, 10.0)?;
        ensure_in_range(kind, "spiral_probability", self.spiral_probability, 0.0..=1.0)
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Whale
    }
}

/// Whale strategy
#[derive(Debug, Clone)]
pub struct WhaleOptimizer {
    config: WoaConfig,
}

impl WhaleOptimizer {
    /// Create the strategy
    pub fn new(config: WoaConfig) -> OptimizerResult<Self> {
        config.validate(AlgorithmKind::Whale.min_population())?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Optimizer for WhaleOptimizer {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Whale
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        let prey = leader_position(&population)?;
        let a = self.config.initial_a * (1.0 - ctx.progress());
        let n = population.size();

        let mut next = Vec::with_capacity(n);
        for whale in population.candidates() {
            let x = whale.position();
            let big_a = 2.0 * a * ctx.rng.gen::<f64>() - a;
            let c = 2.0 * ctx.rng.gen::<f64>();
            let spiral = ctx.rng.gen::<f64>() < self.config.spiral_probability;

            let mut position: Vec<f64> = if spiral {
                let l: f64 = ctx.rng.gen_range(-1.0..=1.0);
                let factor = (self.config.spiral_constant * l).exp() * (2.0 * PI * l).cos();
                x.iter()
                    .zip(&prey)
                    .map(|(xi, pi)| (pi - xi).abs() * factor + pi)
                    .collect()
            } else {
                let target: Vec<f64> = if big_a.abs() < 1.0 {
                    prey.clone()
                } else {
                    population.candidates()[ctx.rng.gen_range(0..n)]
                        .position()
                        .to_vec()
                };
                x.iter()
                    .zip(&target)
                    .map(|(xi, ti)| ti - big_a * (c * ti - xi).abs())
                    .collect()
            };

            ctx.enforce_bounds(&mut position);
            next.push(Candidate::new(position));
        }

        Ok(population.with_candidates(next))
    }
}
