//! Population and candidate management

use crate::bounds::Bounds;
use crate::error::OptimizerResult;
use crate::fitness::{compare_optional, Fitness, SENTINEL_WORST};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Above this size ranking switches to a parallel sort
const PARALLEL_SORT_THRESHOLD: usize = 100;

/// One point in the search space plus its fitness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    position: Vec<f64>,
    fitness: Option<Fitness>,
}

impl Candidate {
    /// Unevaluated candidate
    pub fn new(position: Vec<f64>) -> Self {
        Self {
            position,
            fitness: None,
        }
    }

    /// Candidate with a known fitness
    pub fn with_fitness(position: Vec<f64>, fitness: Fitness) -> Self {
        Self {
            position,
            fitness: Some(fitness),
        }
    }

    /// Coordinates
    #[inline]
    pub fn position(&self) -> &[f64] {
        &self.position
    }

    /// Fitness, `None` until evaluated
    #[inline]
    pub fn fitness(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    /// Primary objective value, `SENTINEL_WORST` if unevaluated
    pub fn primary_fitness(&self) -> f64 {
        self.fitness
            .as_ref()
            .map(Fitness::primary)
            .unwrap_or(SENTINEL_WORST)
    }

    /// Whether a fitness has been assigned
    #[inline]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Strictly better than `other` (unevaluated is never better)
    pub fn is_better_than(&self, other: &Candidate) -> bool {
        match (&self.fitness, &other.fitness) {
            (Some(a), Some(b)) => a.is_better_than(b),
            (Some(_), None) => true,
            _ => false,
        }
    }

    pub(crate) fn set_fitness(&mut self, fitness: Fitness) {
        self.fitness = Some(fitness);
    }

    pub(crate) fn into_position(self) -> Vec<f64> {
        self.position
    }
}

/// All candidates of one generation of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    candidates: Vec<Candidate>,
    generation: u64,
    best: Option<Candidate>,
}

impl Population {
    /// Uniformly random population inside `bounds`
    pub fn initialize<R: Rng + ?Sized>(bounds: &Bounds, size: usize, rng: &mut R) -> Self {
        let candidates = (0..size)
            .map(|_| Candidate::new(bounds.sample(rng)))
            .collect();
        Self::from_candidates(candidates)
    }

    /// Seeded initialisation: the same seed always yields the same population
    pub fn initialize_seeded(bounds: &Bounds, size: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::initialize(bounds, size, &mut rng)
    }

    /// Population from explicit candidates, generation 0
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            generation: 0,
            best: None,
        }
    }

    /// Next generation: carries the generation counter and best-so-far forward
    pub fn successor(&self, candidates: Vec<Candidate>) -> Self {
        let mut next = self.with_candidates(candidates);
        next.advance();
        next
    }

    /// Bump the generation counter
    pub(crate) fn advance(&mut self) {
        self.generation += 1;
    }

    /// Same generation with a replaced candidate buffer
    pub(crate) fn with_candidates(&self, candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            generation: self.generation,
            best: self.best.clone(),
        }
    }

    /// Candidates in slot order
    #[inline]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub(crate) fn candidates_mut(&mut self) -> &mut [Candidate] {
        &mut self.candidates
    }

    /// Generation counter
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of candidates
    #[inline]
    pub fn size(&self) -> usize {
        self.candidates.len()
    }

    /// Best candidate seen across all generations so far
    pub fn best(&self) -> Option<&Candidate> {
        self.best.as_ref()
    }

    /// Whether every candidate has a fitness
    pub fn is_fully_evaluated(&self) -> bool {
        self.candidates.iter().all(Candidate::is_evaluated)
    }

    /// Slots still waiting for evaluation
    pub fn unevaluated_indices(&self) -> Vec<usize> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_evaluated())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Ensure every candidate matches the bounds' dimensionality
    pub fn check_dimensions(&self, bounds: &Bounds) -> OptimizerResult<()> {
        for candidate in &self.candidates {
            bounds.check_dimensions(candidate.position.len())?;
        }
        Ok(())
    }

    /// Best evaluated candidate of this generation; ties go to the lowest slot
    pub fn generation_best(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| c.is_evaluated())
            .min_by(|a, b| compare_optional(a.fitness(), b.fitness()))
    }

    /// Fold this generation into the best-so-far and return it.
    ///
    /// The best-so-far only changes on strict improvement, so earlier finds
    /// win ties and the tracked fitness never regresses.
    pub fn track_best(&mut self) -> Option<&Candidate> {
        let improved = match (self.generation_best(), &self.best) {
            (Some(candidate), Some(best)) if candidate.is_better_than(best) => {
                Some(candidate.clone())
            }
            (Some(candidate), None) => Some(candidate.clone()),
            _ => None,
        };
        if let Some(candidate) = improved {
            self.best = Some(candidate);
        }
        self.best.as_ref()
    }

    /// Slot indices ordered best first (stable, unevaluated last)
    pub fn ranked_indices(&self) -> Vec<usize> {
        let mut indexed: Vec<(usize, Option<&Fitness>)> = self
            .candidates
            .iter()
            .enumerate()
            .map(|(idx, c)| (idx, c.fitness()))
            .collect();

        if indexed.len() > PARALLEL_SORT_THRESHOLD {
            indexed.par_sort_by(|a, b| compare_optional(a.1, b.1));
        } else {
            indexed.sort_by(|a, b| compare_optional(a.1, b.1));
        }

        indexed.into_iter().map(|(idx, _)| idx).collect()
    }

    /// The `n` best candidates
    pub fn select_top(&self, n: usize) -> Vec<&Candidate> {
        self.ranked_indices()
            .into_iter()
            .take(n)
            .map(|idx| &self.candidates[idx])
            .collect()
    }

    /// Mean primary fitness over evaluated, non-sentinel candidates
    pub fn average_fitness(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .candidates
            .iter()
            .filter_map(Candidate::fitness)
            .filter(|f| !f.is_sentinel())
            .map(Fitness::primary)
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Mean per-dimension standard deviation, normalised by bound width (0..~0.5)
    pub fn diversity(&self, bounds: &Bounds) -> f64 {
        let n = self.candidates.len();
        if n < 2 {
            return 0.0;
        }

        let dims = bounds.dimensions();
        let mut total = 0.0;
        for dim in 0..dims {
            let width = bounds.width(dim);
            if width == 0.0 {
                continue;
            }
            let mean = self
                .candidates
                .iter()
                .map(|c| c.position[dim])
                .sum::<f64>()
                / n as f64;
            let variance = self
                .candidates
                .iter()
                .map(|c| (c.position[dim] - mean).powi(2))
                .sum::<f64>()
                / n as f64;
            total += variance.sqrt() / width;
        }

        total / dims as f64
    }
}
