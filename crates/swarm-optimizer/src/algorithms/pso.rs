//! Particle Swarm Optimization
//!
//! Velocities and personal bests live in the strategy, keyed by slot.
//! Positions are always read back from the population, so the swarm stays
//! consistent when another rule (the DEPSO hybrid) moves some slots.

use super::{ensure_in_open_closed, ensure_in_range, leader_position, AlgorithmKind, Optimizer, StepContext, StrategyConfig};
use crate::bounds::Bounds;
use crate::error::OptimizerResult;
use crate::population::{Candidate, Population};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// PSO hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsoConfig {
    /// Inertia weight w, in [0, 1]
    pub inertia: f64,
    /// Inertia reached at the end of the run; `None` keeps it constant
    pub final_inertia: Option<f64>,
    /// Cognitive coefficient c1, in [0, 4]
    pub cognitive: f64,
    /// Social coefficient c2, in [0, 4]
    pub social: f64,
    /// Velocity cap as a fraction of each dimension's width, in (0, 1]
    pub max_velocity_fraction: f64,
    /// Initial velocity range as a fraction of each dimension's width, in [0, 1]
    pub velocity_init_fraction: f64,
}

impl Default for PsoConfig {
    fn default() -> Self {
        Self {
            inertia: 0.7,
            final_inertia: None,
            cognitive: 1.5,
            social: 1.5,
            max_velocity_fraction: 0.2,
            velocity_init_fraction: 0.1,
        }
    }
}

impl StrategyConfig for PsoConfig {
    fn validate(&self, _population_size: usize) -> OptimizerResult<()> {
        let kind = self.kind();
        ensure_in_range(kind, "inertia", self.inertia, 0.0..=1.0)?;
        if let Some(final_inertia) = self.final_inertia {
            ensure_in_range(kind, "final_inertia", final_inertia, 0.0..=1.0)?;
        }
        ensure_in_range(kind, "cognitive", self.cognitive, 0.0..=4.0)?;
        ensure_in_range(kind, "social", self.social, 0.0..=4.0)?;
        ensure_in_open_closed(kind, "max_velocity_fraction", self.max_velocity_fraction, 0.0, 1.0)?;
        ensure_in_range(kind, "velocity_init_fraction", self.velocity_init_fraction, 0.0..=1.0)?;
        Ok(())
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::ParticleSwarm
    }
}

/// Per-slot particle memory
#[derive(Debug, Clone)]
struct Particle {
    velocity: Vec<f64>,
    personal_best: Option<Candidate>,
}

impl Particle {
    fn update_personal_best(&mut self, candidate: &Candidate) {
        let improved = match &self.personal_best {
            Some(best) => candidate.is_better_than(best),
            None => candidate.is_evaluated(),
        };
        if improved {
            self.personal_best = Some(candidate.clone());
        }
    }

    fn clamp_velocity(&mut self, bounds: &Bounds, fraction: f64) {
        for (dim, v) in self.velocity.iter_mut().enumerate() {
            let limit = bounds.width(dim) * fraction;
            *v = v.clamp(-limit, limit);
        }
    }
}

/// Particle Swarm strategy
#[derive(Debug, Clone)]
pub struct ParticleSwarm {
    config: PsoConfig,
    particles: Vec<Particle>,
}

impl ParticleSwarm {
    /// Create the strategy, validating coefficients
    pub fn new(config: PsoConfig) -> OptimizerResult<Self> {
        config.validate(AlgorithmKind::ParticleSwarm.min_population())?;
        Ok(Self {
            config,
            particles: Vec::new(),
        })
    }

    /// Hyperparameters
    pub fn config(&self) -> &PsoConfig {
        &self.config
    }

    /// Inertia at the given run progress
    pub fn inertia_at(&self, progress: f64) -> f64 {
        match self.config.final_inertia {
            Some(end) => self.config.inertia - (self.config.inertia - end) * progress,
            None => self.config.inertia,
        }
    }

    fn ensure_particles(&mut self, size: usize, ctx: &mut StepContext<'_>) {
        if self.particles.len() == size {
            return;
        }
        let init = self.config.velocity_init_fraction;
        self.particles = (0..size)
            .map(|_| Particle {
                velocity: (0..ctx.bounds.dimensions())
                    .map(|dim| {
                        let range = ctx.bounds.width(dim) * init;
                        if range > 0.0 {
                            ctx.rng.gen_range(-range..=range)
                        } else {
                            0.0
                        }
                    })
                    .collect(),
                personal_best: None,
            })
            .collect();
    }

    /// New positions for the particles in `slots`, following the job-wide best
    pub(crate) fn move_particles(
        &mut self,
        population: &Population,
        slots: Range<usize>,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Vec<Vec<f64>>> {
        self.ensure_particles(population.size(), ctx);
        let global_best = leader_position(population)?;
        let inertia = self.inertia_at(ctx.progress());
        let PsoConfig {
            cognitive,
            social,
            max_velocity_fraction,
            ..
        } = self.config;

        let mut moved = Vec::with_capacity(slots.len());
        for slot in slots {
            let candidate = &population.candidates()[slot];
            let particle = &mut self.particles[slot];
            particle.update_personal_best(candidate);

            let position = candidate.position();
            let personal_best = particle
                .personal_best
                .as_ref()
                .map(|c| c.position().to_vec())
                .unwrap_or_else(|| position.to_vec());

            for dim in 0..position.len() {
                let r1: f64 = ctx.rng.gen();
                let r2: f64 = ctx.rng.gen();
                particle.velocity[dim] = inertia * particle.velocity[dim]
                    + cognitive * r1 * (personal_best[dim] - position[dim])
                    + social * r2 * (global_best[dim] - position[dim]);
            }
            particle.clamp_velocity(ctx.bounds, max_velocity_fraction);

            let mut next: Vec<f64> = position
                .iter()
                .zip(&particle.velocity)
                .map(|(x, v)| x + v)
                .collect();
            ctx.enforce_bounds(&mut next);
            moved.push(next);
        }

        Ok(moved)
    }
}

#[async_trait]
impl Optimizer for ParticleSwarm {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::ParticleSwarm
    }

    async fn step(
        &mut self,
        population: Population,
        ctx: &mut StepContext<'_>,
    ) -> OptimizerResult<Population> {
        let positions = self.move_particles(&population, 0..population.size(), ctx)?;
        let next = positions.into_iter().map(Candidate::new).collect();
        Ok(population.with_candidates(next))
    }
}
