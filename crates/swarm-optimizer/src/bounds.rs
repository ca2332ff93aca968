//! Search-space bounds and boundary enforcement

use crate::error::{OptimizerError, OptimizerResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How out-of-range coordinates are brought back inside the bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Snap to the nearest bound
    #[default]
    Clamp,
    /// Mirror back into the range off the violated bound
    Reflect,
}

/// Per-dimension `(min, max)` pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    ranges: Vec<(f64, f64)>,
}

impl Bounds {
    /// Create bounds from explicit ranges
    pub fn new(ranges: Vec<(f64, f64)>) -> OptimizerResult<Self> {
        if ranges.is_empty() {
            return Err(OptimizerError::invalid_descriptor(
                "bounds must declare at least one dimension",
            ));
        }

        for (dim, &(lower, upper)) in ranges.iter().enumerate() {
            if !lower.is_finite() || !upper.is_finite() {
                return Err(OptimizerError::invalid_descriptor(format!(
                    "bounds for dimension {dim} must be finite, got ({lower}, {upper})"
                )));
            }
            if !(upper - lower).is_finite() {
                return Err(OptimizerError::invalid_descriptor(format!(
                    "width of dimension {dim} overflows: ({lower}, {upper})"
                )));
            }
            if lower > upper {
                return Err(OptimizerError::invalid_descriptor(format!(
                    "lower bound must not exceed upper bound in dimension {dim}: ({lower}, {upper})"
                )));
            }
        }

        Ok(Self { ranges })
    }

    /// Same `(lower, upper)` range in every dimension
    pub fn uniform(dimensions: usize, lower: f64, upper: f64) -> OptimizerResult<Self> {
        Self::new(vec![(lower, upper); dimensions])
    }

    /// Number of dimensions
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.ranges.len()
    }

    /// All ranges
    pub fn ranges(&self) -> &[(f64, f64)] {
        &self.ranges
    }

    /// Lower bound of a dimension
    #[inline]
    pub fn lower(&self, dim: usize) -> f64 {
        self.ranges[dim].0
    }

    /// Upper bound of a dimension
    #[inline]
    pub fn upper(&self, dim: usize) -> f64 {
        self.ranges[dim].1
    }

    /// Width of a dimension
    #[inline]
    pub fn width(&self, dim: usize) -> f64 {
        self.ranges[dim].1 - self.ranges[dim].0
    }

    /// Ensure a vector has this dimensionality
    pub fn check_dimensions(&self, actual: usize) -> OptimizerResult<()> {
        if actual != self.dimensions() {
            return Err(OptimizerError::DimensionMismatch {
                expected: self.dimensions(),
                actual,
            });
        }
        Ok(())
    }

    /// Whether every coordinate lies inside its range
    pub fn contains(&self, position: &[f64]) -> bool {
        position.len() == self.dimensions()
            && position
                .iter()
                .zip(&self.ranges)
                .all(|(&x, &(lower, upper))| x >= lower && x <= upper)
    }

    /// Draw a uniformly random point
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.ranges
            .iter()
            .map(|&(lower, upper)| {
                if lower < upper {
                    rng.gen_range(lower..=upper)
                } else {
                    lower
                }
            })
            .collect()
    }

    /// Bring every coordinate back inside its range
    pub fn enforce(&self, policy: BoundaryPolicy, position: &mut [f64]) {
        for (x, &(lower, upper)) in position.iter_mut().zip(&self.ranges) {
            *x = enforce_coordinate(*x, lower, upper, policy);
        }
    }
}

fn enforce_coordinate(x: f64, lower: f64, upper: f64, policy: BoundaryPolicy) -> f64 {
    if x.is_nan() {
        return lower + (upper - lower) / 2.0;
    }
    if x >= lower && x <= upper {
        return x;
    }

    match policy {
        BoundaryPolicy::Clamp => x.clamp(lower, upper),
        BoundaryPolicy::Reflect => {
            let width = upper - lower;
            if width == 0.0 || !x.is_finite() {
                return x.clamp(lower, upper);
            }
            let period = 2.0 * width;
            let offset = (x - lower).rem_euclid(period);
            let reflected = if offset > width {
                period - offset
            } else {
                offset
            };
            (lower + reflected).clamp(lower, upper)
        }
    }
}
