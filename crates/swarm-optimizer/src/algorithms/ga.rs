//! Genetic Algorithm over real-valued genomes

use super::{ensure_in_open_closed, ensure_in_range, AlgorithmKind, Optimizer, StepContext, StrategyConfig};
use crate::error::{OptimizerError, OptimizerResult};
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Parent selection operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionOperator {
    /// Best of `size` uniformly drawn candidates
    Tournament {
        /// Contestants per tournament
        size: usize,
    },
    /// Fitness-proportional selection on inverted (minimised) fitness
    Roulette,
}

impl Default for SelectionOperator {
    fn default() -> Self {
        SelectionOperator::Tournament { size: 3 }
    }
}

/// Recombination operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CrossoverOperator {
    /// BLX-α blend: each gene drawn from the parents' interval widened by α
    Blend {
        /// Interval extension, in [0, 1]
        alpha: f64,
    },
    /// Swap tails after one random cut point
    SinglePoint,
}

impl Default for CrossoverOperator {
    fn default() -> Self {
        CrossoverOperator::Blend { alpha: 0.5 }
    }
}

/// GA hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    /// Parent selection
    pub selection: SelectionOperator,
    /// Recombination
    pub crossover: CrossoverOperator,
    /// Probability a parent pair is recombined, in [0, 1]
    pub crossover_rate: f64,
    /// Per-gene mutation probability, in [0, 1]
    pub mutation_rate: f64,
    /// Mutation standard deviation as a fraction of the dimension width, in (0, 1]
    pub mutation_scale: f64,
    /// Best candidates copied unchanged into the next generation
    pub elitism: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            selection: SelectionOperator::default(),
            crossover: CrossoverOperator::default(),
            crossover_rate: 0.9,
            mutation_rate: 0.1,
            mutation_scale: 0.1,
            elitism: 1,
        }
    }
}

impl StrategyConfig for GaConfig {
    fn validate(&self, population_size: usize) -> OptimizerResult<()> {
        let kind = self.kind();
        ensure_in_range(kind, "crossover_rate", self.crossover_rate, 0.0..=1.0)?;
        ensure_in_range(kind, "mutation_rate", self.mutation_rate, 0.0..=1.0)?;
        ensure_in_open_closed(kind, "mutation_scale", self.mutation_scale, 0.0, 1.0)?;

        if let SelectionOperator::Tournament { size } = self.selection {
            if size == 0 || size > population_size {
                return Err(OptimizerError::invalid_hyperparameter(
                    kind.name(),
                    "tournament_size",
                    size as f64,
                    format!("must be in [1, {population_size}]"),
                ));
            }
        }

        if let CrossoverOperator::Blend { alpha } = self.crossover {
            ensure_in_range(kind, "blend_alpha", alpha, 0.0..=1.0)?;
        }

        if self.elitism >= population_size {
            return Err(OptimizerError::invalid_hyperparameter(
                kind.name(),
                "elitism",
                self.elitism as f64,
                format!("must be below the population size {population_size}"),
            ));
        }

        Ok(())
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Genetic
    }
}

/// Genetic Algorithm strategy
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    config: GaConfig,
}

impl GeneticAlgorithm {
    /// Create the strategy for a fixed population size
    pub fn new(config: GaConfig, population_size: usize) -> OptimizerResult<Self> {
        config.validate(population_size)?;
        Ok(Self { config })
    }

    /// Hyperparameters
    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    fn select_parent<R: Rng + ?Sized>(
        &self,
        population: &Population,
        roulette: Option<&WeightedIndex<f64>>,
        rng: &mut R,
    ) -> usize {
        let n = population.size();
        match (self.config.selection, roulette) {
            (SelectionOperator::Roulette, Some(weights)) => weights.sample(rng),
            (SelectionOperator::Roulette, None) => rng.gen_range(0..n),
            (SelectionOperator::Tournament { size }, _) => {
                let mut winner = rng.gen_range(0..n);
                for _ in 1..size {
                    let challenger = rng.gen_range(0..n);
                    if population.candidates()[challenger]
                        .is_better_than(&population.candidates()[winner])
                    {
                        winner = challenger;
                    }
                }
                winner
            }
        }
    }

    fn recombine<R: Rng + ?Sized>(
        &self,
        first: &[f64],
        second: &[f64],
        rng: &mut R,
    ) -> (Vec<f64>, Vec<f64>) {
        if rng.gen::<f64>() >= self.config.crossover_rate {
            return (first.to_vec(), second.to_vec());
        }

        match self.config.crossover {
            CrossoverOperator::Blend { alpha } => {
                let mut child_a = Vec::with_capacity(first.len());
                let mut child_b = Vec::with_capacity(first.len());
                for (&x, &y) in first.iter().zip(second) {
                    let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
                    let spread = (hi - lo) * alpha;
                    let (lo, hi) = (lo - spread, hi + spread);
                    if hi > lo {
                        child_a.push(rng.gen_range(lo..=hi));
                        child_b.push(rng.gen_range(lo..=hi));
                    } else {
                        child_a.push(lo);
                        child_b.push(lo);
                    }
                }
                (child_a, child_b)
            }
            CrossoverOperator::SinglePoint => {
                if first.len() < 2 {
                    return (second.to_vec(), first.to_vec());
                }
                let cut = rng.gen_range(1..first.len());
                let mut child_a = first[..cut].to_vec();
                child_a.extend_from_slice(&second[cut..]);
                let mut child_b = second[..cut].to_vec();
                child_b.extend_from_slice(&first[cut..]);
                (child_a, child_b)
            }
        }
    }

    fn mutate(&self, genes: &mut [f64], ctx: &mut StepContext<'_>) {
        for (dim, gene) in genes.iter_mut().enumerate() {
            if ctx.rng.gen::<f64>() < self.config.mutation_rate {
                let sigma = ctx.bounds.width(dim) * self.config.mutation_scale;
                if let Ok(normal) = Normal::new(0.0, sigma) {
                    *gene += normal.sample(ctx.rng);
                }
            }
        }
    }
}

/// Roulette weights: distance below the worst non-sentinel fitness
fn roulette_weights(population: &Population) -> Option<WeightedIndex<f64>> {
    let values: Vec<Option<f64>> = population
        .candidates()
        .iter()
        .map(|c| c.fitness().filter(|f| !f.is_sentinel()).map(|f| f.primary()))
        .collect();

    let finite: Vec<f64> = values.iter().flatten().copied().collect();
    let worst = finite.iter().copied().fold(f64::MIN, f64::max);
    let best = finite.iter().copied().fold(f64::MAX, f64::min);
    if finite.is_empty() || !(worst - best).is_finite() {
        return None;
    }

    let floor = (worst - best) * 1e-3 + f64::EPSILON;
    let weights = values
        .iter()
        .map(|v| v.map(|f| worst - f + floor).unwrap_or(0.0));
    WeightedIndex::new(weights).ok()
}

#[async_trait]
impl Optimizer for GeneticAlgorithm {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Genetic
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        let n = population.size();
        let mut next: Vec<Candidate> = population
            .select_top(self.config.elitism)
            .into_iter()
            .cloned()
            .collect();

        let roulette = match self.config.selection {
            SelectionOperator::Roulette => roulette_weights(&population),
            SelectionOperator::Tournament { .. } => None,
        };

        while next.len() < n {
            let first = self.select_parent(&population, roulette.as_ref(), ctx.rng);
            let second = self.select_parent(&population, roulette.as_ref(), ctx.rng);
            let (mut child_a, mut child_b) = self.recombine(
                population.candidates()[first].position(),
                population.candidates()[second].position(),
                ctx.rng,
            );

            self.mutate(&mut child_a, ctx);
            ctx.enforce_bounds(&mut child_a);
            next.push(Candidate::new(child_a));

            if next.len() < n {
                self.mutate(&mut child_b, ctx);
                ctx.enforce_bounds(&mut child_b);
                next.push(Candidate::new(child_b));
            }
        }

        Ok(population.with_candidates(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{BoundaryPolicy, Bounds};
    use crate::config::EvaluationPolicy;
    use crate::evaluator::Evaluator;
    use crate::fitness::Fitness;
    use crate::objective::Sphere;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn scored(values: &[f64]) -> Population {
        Population::from_candidates(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| Candidate::with_fitness(vec![i as f64, i as f64], Fitness::Scalar(v)))
                .collect(),
        )
    }

    #[test]
    fn test_validation() {
        assert!(GeneticAlgorithm::new(GaConfig::default(), 10).is_ok());

        let config = GaConfig {
            elitism: 10,
            ..Default::default()
        };
        assert!(GeneticAlgorithm::new(config, 10).is_err());

        let config = GaConfig {
            selection: SelectionOperator::Tournament { size: 0 },
            ..Default::default()
        };
        assert!(GeneticAlgorithm::new(config, 10).is_err());

        let config = GaConfig {
            mutation_rate: 1.5,
            ..Default::default()
        };
        assert!(GeneticAlgorithm::new(config, 10).is_err());
    }

    #[test]
    fn test_single_point_crossover_swaps_tails() {
        let ga = GeneticAlgorithm::new(
            GaConfig {
                crossover: CrossoverOperator::SinglePoint,
                crossover_rate: 1.0,
                ..Default::default()
            },
            4,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let (a, b) = ga.recombine(&[0.0, 0.0, 0.0, 0.0], &[1.0, 1.0, 1.0, 1.0], &mut rng);
        assert_eq!(a[0], 0.0);
        assert_eq!(b[0], 1.0);
        assert_eq!(a[3], 1.0);
        assert_eq!(b[3], 0.0);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x + y, 1.0);
        }
    }

    #[test]
    fn test_blend_crossover_stays_in_widened_interval() {
        let ga = GeneticAlgorithm::new(
            GaConfig {
                crossover: CrossoverOperator::Blend { alpha: 0.5 },
                crossover_rate: 1.0,
                ..Default::default()
            },
            4,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..100 {
            let (a, b) = ga.recombine(&[0.0], &[2.0], &mut rng);
            assert!((-1.0..=3.0).contains(&a[0]));
            assert!((-1.0..=3.0).contains(&b[0]));
        }
    }

    #[test]
    fn test_roulette_weights_favor_lower_fitness() {
        let pop = scored(&[1.0, 10.0, 100.0]);
        let weights = roulette_weights(&pop).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut counts = [0usize; 3];
        for _ in 0..3000 {
            counts[weights.sample(&mut rng)] += 1;
        }
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[2]);

        let failed = Population::from_candidates(vec![
            Candidate::with_fitness(vec![0.0], Fitness::worst(1)),
            Candidate::with_fitness(vec![1.0], Fitness::worst(1)),
        ]);
        assert!(roulette_weights(&failed).is_none());
    }

    #[tokio::test]
    async fn test_elites_survive_unchanged() {
        let bounds = Bounds::uniform(2, -5.0, 5.0).unwrap();
        let evaluator = Evaluator::new(
            Arc::new(Sphere::new(bounds.clone())),
            EvaluationPolicy::default(),
        );
        let population = scored(&[4.0, 0.5, 3.0, 2.0, 9.0, 1.0]);
        let mut ga = GeneticAlgorithm::new(
            GaConfig {
                elitism: 2,
                selection: SelectionOperator::Roulette,
                ..Default::default()
            },
            6,
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(10);
        let mut ctx = StepContext {
            rng: &mut rng,
            evaluator: &evaluator,
            bounds: &bounds,
            boundary: BoundaryPolicy::Clamp,
            generation: 0,
            max_generations: 10,
        };
        let next = ga.step(population, &mut ctx).await.unwrap();

        assert_eq!(next.size(), 6);
        assert_eq!(next.candidates()[0].primary_fitness(), 0.5);
        assert_eq!(next.candidates()[1].primary_fitness(), 1.0);
        assert_eq!(next.unevaluated_indices(), vec![2, 3, 4, 5]);
        assert!(next.candidates().iter().all(|c| bounds.contains(c.position())));
    }
}
