//! Continuous-domain Ant Colony Optimization
//!
//! The pheromone "trail" is a bounded archive of good candidates. Each entry
//! carries a pheromone weight that evaporates every generation and is
//! replenished by rank when fresh candidates are deposited. New candidates
//! are sampled around an archive entry chosen proportionally to pheromone,
//! with a Gaussian whose spread follows the archive's own dispersion.

use super::{ensure_in_open_closed, ensure_in_range, AlgorithmKind, Optimizer, StepContext, StrategyConfig};
use crate::error::{OptimizerError, OptimizerResult};
use crate::fitness::{compare_optional, Fitness};
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Entries whose pheromone falls below this are dropped
const PHEROMONE_FLOOR: f64 = 1e-12;

/// ACO hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcoConfig {
    /// Archive capacity; defaults to the population size
    pub archive_size: Option<usize>,
    /// Evaporation rate ρ, in [0, 1)
    pub evaporation_rate: f64,
    /// Locality q: small values concentrate deposits on top-ranked entries, in (0, 1]
    pub locality: f64,
    /// Spread ξ scaling the sampling deviation, in (0, 2]
    pub deviation_scale: f64,
}

impl Default for AcoConfig {
    fn default() -> Self {
        Self {
            archive_size: None,
            evaporation_rate: 0.1,
            locality: 0.3,
            deviation_scale: 0.85,
        }
    }
}

impl StrategyConfig for AcoConfig {
    fn validate(&self, _population_size: usize) -> OptimizerResult<()> {
        let kind = self.kind();
        if !(0.0..1.0).contains(&self.evaporation_rate) {
            return Err(OptimizerError::invalid_hyperparameter(
                kind.name(),
                "evaporation_rate",
                self.evaporation_rate,
                "must be in [0, 1)",
            ));
        }
        ensure_in_open_closed(kind, "locality", self.locality, 0.0, 1.0)?;
        ensure_in_open_closed(kind, "deviation_scale", self.deviation_scale, 0.0, 2.0)?;
        if let Some(size) = self.archive_size {
            ensure_in_range(kind, "archive_size", size as f64, 2.0..=f64::MAX)?;
        }
        Ok(())
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::AntColony
    }
}

/// One remembered solution and its pheromone
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Solution coordinates
    pub position: Vec<f64>,
    /// Solution fitness
    pub fitness: Fitness,
    /// Current pheromone weight
    pub pheromone: f64,
}

/// Ant Colony strategy owning its pheromone archive
#[derive(Debug, Clone)]
pub struct AntColonyOptimizer {
    config: AcoConfig,
    capacity: usize,
    archive: Vec<ArchiveEntry>,
}

impl AntColonyOptimizer {
    /// Create the strategy with an empty archive
    pub fn new(config: AcoConfig, population_size: usize) -> OptimizerResult<Self> {
        config.validate(population_size)?;
        let capacity = config.archive_size.unwrap_or(population_size).max(2);
        Ok(Self {
            config,
            capacity,
            archive: Vec::with_capacity(capacity * 2),
        })
    }

    /// Archive, best first
    pub fn archive(&self) -> &[ArchiveEntry] {
        &self.archive
    }

    /// Pheromone deposited on the entry of the given rank
    fn deposit(&self, rank: usize) -> f64 {
        let spread = self.config.locality * self.capacity as f64;
        (-((rank * rank) as f64) / (2.0 * spread * spread)).exp()
    }

    /// Evaporate, deposit the evaluated generation, then keep the best `capacity` entries
    pub(crate) fn update_archive(&mut self, population: &Population) {
        let keep = 1.0 - self.config.evaporation_rate;
        for entry in &mut self.archive {
            entry.pheromone *= keep;
        }

        let fresh_start = self.archive.len();
        for candidate in population.candidates() {
            if let Some(fitness) = candidate.fitness() {
                self.archive.push(ArchiveEntry {
                    position: candidate.position().to_vec(),
                    fitness: fitness.clone(),
                    pheromone: 0.0,
                });
            }
        }

        // Stable order: older entries win fitness ties
        let mut order: Vec<usize> = (0..self.archive.len()).collect();
        order.sort_by(|&a, &b| {
            compare_optional(Some(&self.archive[a].fitness), Some(&self.archive[b].fitness))
        });
        let mut ranked: Vec<ArchiveEntry> = Vec::with_capacity(order.len());
        for (rank, idx) in order.into_iter().enumerate() {
            let mut entry = self.archive[idx].clone();
            if idx >= fresh_start {
                entry.pheromone += self.deposit(rank);
            }
            ranked.push(entry);
        }

        ranked.retain(|e| e.pheromone > PHEROMONE_FLOOR);
        ranked.truncate(self.capacity);
        self.archive = ranked;
    }

    /// Draw one candidate position from the archive
    fn sample_position(
        &self,
        weights: &WeightedIndex<f64>,
        ctx: &mut StepContext<'_>,
    ) -> Vec<f64> {
        let guide = weights.sample(ctx.rng);
        let k = self.archive.len();
        let centre = &self.archive[guide].position;

        let mut position = Vec::with_capacity(centre.len());
        for (dim, &mean) in centre.iter().enumerate() {
            let dispersion = if k > 1 {
                self.archive
                    .iter()
                    .map(|e| (e.position[dim] - mean).abs())
                    .sum::<f64>()
                    / (k - 1) as f64
            } else {
                0.0
            };
            let sigma = self.config.deviation_scale * dispersion;
            let value = match Normal::new(mean, sigma) {
                Ok(normal) if sigma > 0.0 => normal.sample(ctx.rng),
                _ => mean,
            };
            position.push(value);
        }

        ctx.enforce_bounds(&mut position);
        position
    }
}

#[async_trait]
impl Optimizer for AntColonyOptimizer {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::AntColony
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        self.update_archive(&population);

        let weights = WeightedIndex::new(self.archive.iter().map(|e| e.pheromone));
        let next: Vec<Candidate> = match weights {
            Ok(weights) => (0..population.size())
                .map(|_| Candidate::new(self.sample_position(&weights, ctx)))
                .collect(),
            // Empty archive: restart from uniform samples
            Err(_) => (0..population.size())
                .map(|_| Candidate::new(ctx.bounds.sample(ctx.rng)))
                .collect(),
        };

        Ok(population.with_candidates(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{BoundaryPolicy, Bounds};
    use crate::config::EvaluationPolicy;
    use crate::evaluator::Evaluator;
    use crate::objective::Sphere;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn scored(values: &[f64]) -> Population {
        Population::from_candidates(
            values
                .iter()
                .map(|&v| Candidate::with_fitness(vec![v], Fitness::Scalar(v)))
                .collect(),
        )
    }

    #[test]
    fn test_validation() {
        let config = AcoConfig {
            evaporation_rate: 1.0,
            ..Default::default()
        };
        assert!(AntColonyOptimizer::new(config, 10).is_err());

        let config = AcoConfig {
            locality: 0.0,
            ..Default::default()
        };
        assert!(AntColonyOptimizer::new(config, 10).is_err());

        let config = AcoConfig {
            archive_size: Some(1),
            ..Default::default()
        };
        assert!(AntColonyOptimizer::new(config, 10).is_err());
    }

    #[test]
    fn test_archive_is_bounded_sorted_and_decaying() {
        let mut aco = AntColonyOptimizer::new(
            AcoConfig {
                archive_size: Some(3),
                evaporation_rate: 0.5,
                ..Default::default()
            },
            4,
        )
        .unwrap();

        aco.update_archive(&scored(&[4.0, 1.0, 3.0, 2.0]));
        let fitness: Vec<f64> = aco.archive().iter().map(|e| e.fitness.primary()).collect();
        assert_eq!(fitness, vec![1.0, 2.0, 3.0]);
        let top = aco.archive()[0].pheromone;
        assert!((top - 1.0).abs() < 1e-12);
        assert!(aco.archive()[1].pheromone < top);

        // A generation of worse candidates only evaporates what is stored
        aco.update_archive(&scored(&[10.0, 11.0, 12.0, 13.0]));
        assert_eq!(aco.archive().len(), 3);
        assert_eq!(aco.archive()[0].fitness.primary(), 1.0);
        assert!((aco.archive()[0].pheromone - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_step_samples_full_population_within_bounds() {
        let bounds = Bounds::uniform(2, -1.0, 1.0).unwrap();
        let evaluator = Evaluator::new(
            Arc::new(Sphere::new(bounds.clone())),
            EvaluationPolicy::default(),
        );
        let mut rng = StdRng::seed_from_u64(21);
        let population = evaluator
            .evaluate_population(Population::initialize(&bounds, 12, &mut rng))
            .await
            .unwrap();

        let mut aco = AntColonyOptimizer::new(AcoConfig::default(), 12).unwrap();
        let mut ctx = StepContext {
            rng: &mut rng,
            evaluator: &evaluator,
            bounds: &bounds,
            boundary: BoundaryPolicy::Reflect,
            generation: 0,
            max_generations: 10,
        };
        let next = aco.step(population, &mut ctx).await.unwrap();

        assert_eq!(next.size(), 12);
        assert_eq!(next.unevaluated_indices().len(), 12);
        assert!(next.candidates().iter().all(|c| bounds.contains(c.position())));
        assert_eq!(aco.archive().len(), 12);
    }
}
