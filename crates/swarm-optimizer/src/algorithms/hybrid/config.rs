//! Configuration types for the DEPSO hybrid

use crate::algorithms::{AlgorithmKind, DeConfig, PsoConfig, StrategyConfig};
use crate::error::{OptimizerError, OptimizerResult};
use serde::{Deserialize, Serialize};

/// How the two rules share the population
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HybridMode {
    /// Fixed slot split; `de_fraction` of the slots follow DE
    Split {
        /// Share of slots driven by DE, in (0, 1)
        de_fraction: f64,
    },
    /// Whole population alternates DE (even generations) and PSO (odd)
    Alternate,
}

impl Default for HybridMode {
    fn default() -> Self {
        HybridMode::Split { de_fraction: 0.5 }
    }
}

/// DEPSO configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DepsoConfig {
    /// DE hyperparameters
    pub de: DeConfig,
    /// PSO hyperparameters
    pub pso: PsoConfig,
    /// Population sharing mode
    pub mode: HybridMode,
}

impl DepsoConfig {
    /// Number of DE slots for a population size; 0 in alternate mode
    pub fn de_slots(&self, population_size: usize) -> usize {
        match self.mode {
            HybridMode::Split { de_fraction } => {
                ((population_size as f64 * de_fraction).round() as usize)
                    .clamp(1, population_size.saturating_sub(1).max(1))
            }
            HybridMode::Alternate => 0,
        }
    }
}

impl StrategyConfig for DepsoConfig {
    fn validate(&self, population_size: usize) -> OptimizerResult<()> {
        self.de.validate(population_size)?;
        self.pso.validate(population_size)?;

        if let HybridMode::Split { de_fraction } = self.mode {
            if !(de_fraction > 0.0 && de_fraction < 1.0) {
                return Err(OptimizerError::invalid_hyperparameter(
                    self.kind().name(),
                    "de_fraction",
                    de_fraction,
                    "must be in (0, 1)",
                ));
            }
        }

        Ok(())
    }

    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Depso
    }
}
