//! Differential Evolution
//!
//! Each target vector competes against a trial built from a mutant
//! `base + F (b - c)` and binomial crossover. The trial replaces the target
//! when it is no worse, so every slot's fitness is non-increasing.

use super::{
    distinct_indices, ensure_in_open_closed, ensure_in_range, AlgorithmKind, Optimizer,
    StepContext, StrategyConfig,
};
use crate::error::OptimizerResult;
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::trace;

/// Mutation base selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeStrategy {
    /// `rand/1/bin`: random base vector
    #[default]
    Rand1Bin,
    /// `best/1/bin`: best-so-far as base vector
    Best1Bin,
}

/// DE hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeConfig {
    /// Differential weight F, in (0, 2]
    pub mutation_factor: f64,
    /// Crossover probability CR, in [0, 1]
    pub crossover_rate: f64,
    /// Base vector selection
    pub strategy: DeStrategy,
}

impl Default for DeConfig {
    fn default() -> Self {
        Self {
            mutation_factor: 0.8,
            crossover_rate: 0.9,
            strategy: DeStrategy::Rand1Bin,
        }
    }
}

impl StrategyConfig for DeConfig {
    fn validate(&self, _population_size: usize) -> OptimizerResult<()> {
        ensure_in_open_closed(self.kind(), "mutation_factor", self.mutation_factor, 0.0, 2.0)?;
        ensure_in_range(self.kind(), "crossover_rate", self.crossover_rate, 0.0..=1.0)?;
        Ok(())
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::DifferentialEvolution
    }
}

/// Differential Evolution strategy
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    config: DeConfig,
}

impl DifferentialEvolution {
    /// Create the strategy, validating F and CR
    pub fn new(config: DeConfig) -> OptimizerResult<Self> {
        config.validate(AlgorithmKind::DifferentialEvolution.min_population())?;
        Ok(Self { config })
    }

    /// Hyperparameters
    pub fn config(&self) -> &DeConfig {
        &self.config
    }

    /// Build one trial vector per slot in `slots`; donors come from the whole population
    pub(crate) fn build_trials(
        &self,
        population: &Population,
        slots: Range<usize>,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Vec<Vec<f64>>> {
        let n = population.size();
        let best = match self.config.strategy {
            DeStrategy::Best1Bin => Some(super::leader_position(population)?),
            DeStrategy::Rand1Bin => None,
        };

        let mut trials = Vec::with_capacity(slots.len());
        for target_idx in slots {
            let target = population.candidates()[target_idx].position();

            let mutant: Vec<f64> = match &best {
                Some(base) => {
                    let donors = distinct_indices(ctx.rng, n, target_idx, 2);
                    let b = population.candidates()[donors[0]].position();
                    let c = population.candidates()[donors[1]].position();
                    mutate(base, b, c, self.config.mutation_factor)
                }
                None => {
                    let donors = distinct_indices(ctx.rng, n, target_idx, 3);
                    let a = population.candidates()[donors[0]].position();
                    let b = population.candidates()[donors[1]].position();
                    let c = population.candidates()[donors[2]].position();
                    mutate(a, b, c, self.config.mutation_factor)
                }
            };

            let mut trial = crossover(ctx.rng, target, &mutant, self.config.crossover_rate);
            ctx.enforce_bounds(&mut trial);
            trials.push(trial);
        }

        Ok(trials)
    }
}

fn mutate(a: &[f64], b: &[f64], c: &[f64], factor: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .zip(c)
        .map(|((a, b), c)| a + factor * (b - c))
        .collect()
}

/// Binomial crossover with one forced mutant dimension
pub(crate) fn crossover<R: Rng + ?Sized>(
    rng: &mut R,
    target: &[f64],
    mutant: &[f64],
    crossover_rate: f64,
) -> Vec<f64> {
    let forced = rng.gen_range(0..target.len());
    target
        .iter()
        .zip(mutant)
        .enumerate()
        .map(|(j, (&t, &m))| {
            if j == forced || rng.gen::<f64>() < crossover_rate {
                m
            } else {
                t
            }
        })
        .collect()
}

/// Greedy replacement: the trial wins unless strictly worse than the target
pub(crate) fn select(target: &Candidate, trial: Candidate) -> Candidate {
    match (target.fitness(), trial.fitness()) {
        (Some(old), Some(new)) if !new.is_no_worse_than(old) => target.clone(),
        (Some(_), None) => target.clone(),
        _ => trial,
    }
}

#[async_trait]
impl Optimizer for DifferentialEvolution {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::DifferentialEvolution
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        let trials = self.build_trials(&population, 0..population.size(), ctx)?;
        let fitness = ctx.evaluator.evaluate_batch(trials.clone()).await?;

        let mut replaced = 0usize;
        let next: Vec<Candidate> = population
            .candidates()
            .iter()
            .zip(trials.into_iter().zip(fitness))
            .map(|(target, (position, value))| {
                let winner = select(target, Candidate::with_fitness(position, value));
                if winner != *target {
                    replaced += 1;
                }
                winner
            })
            .collect();

        trace!(generation = ctx.generation, replaced, "DE selection complete");
        Ok(population.with_candidates(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{BoundaryPolicy, Bounds};
    use crate::config::EvaluationPolicy;
    use crate::error::OptimizerError;
    use crate::evaluator::Evaluator;
    use crate::fitness::Fitness;
    use crate::objective::Sphere;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn test_hyperparameter_validation() {
        let bad_f = DeConfig {
            mutation_factor: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            DifferentialEvolution::new(bad_f),
            Err(OptimizerError::InvalidHyperparameter { .. })
        ));

        let bad_f = DeConfig {
            mutation_factor: 2.5,
            ..Default::default()
        };
        assert!(DifferentialEvolution::new(bad_f).is_err());

        let bad_cr = DeConfig {
            crossover_rate: 1.1,
            ..Default::default()
        };
        assert!(DifferentialEvolution::new(bad_cr).is_err());

        let edge = DeConfig {
            mutation_factor: 2.0,
            crossover_rate: 0.0,
            ..Default::default()
        };
        assert!(DifferentialEvolution::new(edge).is_ok());
    }

    #[test]
    fn test_zero_crossover_rate_changes_exactly_one_dimension() {
        let mut rng = StdRng::seed_from_u64(11);
        let target = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mutant = vec![-1.0, -2.0, -3.0, -4.0, -5.0];
        for _ in 0..50 {
            let trial = crossover(&mut rng, &target, &mutant, 0.0);
            let differing = trial.iter().zip(&target).filter(|(a, b)| a != b).count();
            assert_eq!(differing, 1);
        }
    }

    #[test]
    fn test_full_crossover_rate_takes_mutant() {
        let mut rng = StdRng::seed_from_u64(5);
        let trial = crossover(&mut rng, &[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0], 1.0);
        assert_eq!(trial, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_greedy_selection_keeps_ties() {
        let target = Candidate::with_fitness(vec![0.0], Fitness::Scalar(1.0));
        let tie = Candidate::with_fitness(vec![1.0], Fitness::Scalar(1.0));
        let worse = Candidate::with_fitness(vec![2.0], Fitness::Scalar(2.0));
        assert_eq!(select(&target, tie.clone()), tie);
        assert_eq!(select(&target, worse), target);
    }

    #[tokio::test]
    async fn test_step_never_worsens_any_slot() {
        let bounds = Bounds::uniform(2, -5.0, 5.0).unwrap();
        let evaluator = Evaluator::new(
            Arc::new(Sphere::new(bounds.clone())),
            EvaluationPolicy::default(),
        );
        let mut rng = StdRng::seed_from_u64(42);
        let population = Population::initialize(&bounds, 10, &mut rng);
        let mut population = evaluator.evaluate_population(population).await.unwrap();
        population.track_best();

        let mut de = DifferentialEvolution::new(DeConfig {
            strategy: DeStrategy::Best1Bin,
            ..Default::default()
        })
        .unwrap();

        let before: Vec<f64> = population.candidates().iter().map(|c| c.primary_fitness()).collect();
        let mut ctx = StepContext {
            rng: &mut rng,
            evaluator: &evaluator,
            bounds: &bounds,
            boundary: BoundaryPolicy::Clamp,
            generation: 0,
            max_generations: 10,
        };
        let next = de.step(population, &mut ctx).await.unwrap();

        assert!(next.is_fully_evaluated());
        assert_eq!(next.size(), 10);
        for (old, new) in before.iter().zip(next.candidates()) {
            assert!(new.primary_fitness() <= *old);
            assert!(bounds.contains(new.position()));
        }
    }
}
