//! DEPSO coordinator

use super::config::{DepsoConfig, HybridMode};
use crate::algorithms::de::{self, DifferentialEvolution};
use crate::algorithms::pso::ParticleSwarm;
use crate::algorithms::{AlgorithmKind, Optimizer, StepContext, StrategyConfig};
use crate::error::OptimizerResult;
use crate::fitness::compare_optional;
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::ops::Range;
use tracing::trace;

/// DE/PSO hybrid strategy
#[derive(Debug, Clone)]
pub struct DepsoOptimizer {
    pub(super) config: DepsoConfig,
    pub(super) de: DifferentialEvolution,
    pub(super) pso: ParticleSwarm,
    pub(super) de_slots: usize,
}

impl DepsoOptimizer {
    /// Validate both parameter sets together and build the coordinator
    pub fn new(config: DepsoConfig, population_size: usize) -> OptimizerResult<Self> {
        config.validate(population_size)?;
        Ok(Self {
            de: DifferentialEvolution::new(config.de.clone())?,
            pso: ParticleSwarm::new(config.pso.clone())?,
            de_slots: config.de_slots(population_size),
            config,
        })
    }

    /// Configuration
    pub fn config(&self) -> &DepsoConfig {
        &self.config
    }

    /// Slots `[0, de_slots)` follow DE in split mode
    pub fn de_slots(&self) -> usize {
        self.de_slots
    }

    async fn split_step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        let n = population.size();
        let k = self.de_slots.min(n);

        let mut proposals = self.de.build_trials(&population, 0..k, ctx)?;
        proposals.extend(self.pso.move_particles(&population, k..n, ctx)?);
        let fitness = ctx.evaluator.evaluate_batch(proposals.clone()).await?;

        let mut next: Vec<Candidate> = proposals
            .into_iter()
            .zip(fitness)
            .enumerate()
            .map(|(slot, (position, value))| {
                let proposal = Candidate::with_fitness(position, value);
                if slot < k {
                    de::select(&population.candidates()[slot], proposal)
                } else {
                    proposal
                }
            })
            .collect();

        let migrations = migrate(&mut next, k);
        trace!(generation = ctx.generation, migrations, "DEPSO merge complete");
        Ok(population.with_candidates(next))
    }
}

/// Index of the best (`Less`) or worst (`Greater`) candidate in `range`
fn extreme(candidates: &[Candidate], range: Range<usize>, want: Ordering) -> Option<usize> {
    let mut found: Option<usize> = None;
    for idx in range {
        let replace = match found {
            None => true,
            Some(current) => {
                compare_optional(candidates[idx].fitness(), candidates[current].fitness()) == want
            }
        };
        if replace {
            found = Some(idx);
        }
    }
    found
}

/// Exchange members between the DE slots `[0, k)` and the PSO slots `[k, n)`.
///
/// Each side's best replaces the other side's worst when strictly better.
/// Returns the number of replacements.
pub(super) fn migrate(candidates: &mut [Candidate], k: usize) -> usize {
    let n = candidates.len();
    if k == 0 || k >= n {
        return 0;
    }

    let (de_best, de_worst, pso_best, pso_worst) = match (
        extreme(candidates, 0..k, Ordering::Less),
        extreme(candidates, 0..k, Ordering::Greater),
        extreme(candidates, k..n, Ordering::Less),
        extreme(candidates, k..n, Ordering::Greater),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return 0,
    };

    let de_champion = candidates[de_best].clone();
    let pso_champion = candidates[pso_best].clone();
    let mut migrations = 0;

    if de_champion.is_better_than(&candidates[pso_worst]) {
        candidates[pso_worst] = de_champion;
        migrations += 1;
    }
    if pso_champion.is_better_than(&candidates[de_worst]) {
        candidates[de_worst] = pso_champion;
        migrations += 1;
    }

    migrations
}

#[async_trait]
impl Optimizer for DepsoOptimizer {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Depso
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        match self.config.mode {
            HybridMode::Split { .. } => self.split_step(population, ctx).await,
            HybridMode::Alternate if ctx.generation % 2 == 0 => self.de.step(population, ctx).await,
            HybridMode::Alternate => self.pso.step(population, ctx).await,
        }
    }
}
