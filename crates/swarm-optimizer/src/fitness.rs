//! Fitness values and their minimisation ordering

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sentinel assigned to candidates whose evaluation could not complete
pub const SENTINEL_WORST: f64 = f64::MAX;

/// Quality measure of a candidate. Lower is better.
///
/// Multi-objective fitness is an ordered tuple compared lexicographically:
/// the first objective dominates, later objectives break ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fitness {
    /// Single objective
    Scalar(f64),
    /// Ordered objectives, most significant first
    Vector(Vec<f64>),
}

impl Fitness {
    /// Worst possible fitness for the given number of objectives
    pub fn worst(objectives: usize) -> Self {
        if objectives <= 1 {
            Fitness::Scalar(SENTINEL_WORST)
        } else {
            Fitness::Vector(vec![SENTINEL_WORST; objectives])
        }
    }

    /// Objective values in significance order
    pub fn values(&self) -> &[f64] {
        match self {
            Fitness::Scalar(value) => std::slice::from_ref(value),
            Fitness::Vector(values) => values,
        }
    }

    /// Most significant objective, used for convergence history
    pub fn primary(&self) -> f64 {
        self.values().first().copied().unwrap_or(SENTINEL_WORST)
    }

    /// Number of objectives
    pub fn objectives(&self) -> usize {
        self.values().len()
    }

    /// Whether this is the evaluation-failure sentinel
    pub fn is_sentinel(&self) -> bool {
        self.values().iter().all(|&v| v == SENTINEL_WORST)
    }

    /// Whether every component is finite, so nothing can rank past the sentinel
    pub fn is_valid(&self) -> bool {
        !self.values().is_empty() && self.values().iter().all(|v| v.is_finite())
    }

    /// Total minimisation order: `Less` means `self` is better
    pub fn compare(&self, other: &Fitness) -> Ordering {
        let lhs = self.values();
        let rhs = other.values();
        for (a, b) in lhs.iter().zip(rhs) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        lhs.len().cmp(&rhs.len())
    }

    /// Strictly better than `other`
    #[inline]
    pub fn is_better_than(&self, other: &Fitness) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// Better than or equal to `other`
    #[inline]
    pub fn is_no_worse_than(&self, other: &Fitness) -> bool {
        self.compare(other) != Ordering::Greater
    }
}

impl From<f64> for Fitness {
    fn from(value: f64) -> Self {
        Fitness::Scalar(value)
    }
}

impl From<Vec<f64>> for Fitness {
    fn from(values: Vec<f64>) -> Self {
        Fitness::Vector(values)
    }
}

/// Compare optional fitness values, unevaluated sorts last
pub(crate) fn compare_optional(a: Option<&Fitness>, b: Option<&Fitness>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_finite_components_are_invalid() {
        assert!(Fitness::from(1.0).is_valid());
        assert!(Fitness::worst(2).is_valid());
        assert!(!Fitness::from(f64::INFINITY).is_valid());
        assert!(!Fitness::from(f64::NEG_INFINITY).is_valid());
        assert!(!Fitness::from(f64::NAN).is_valid());
        assert!(!Fitness::Vector(vec![0.0, f64::INFINITY]).is_valid());
    }

    #[test]
    fn test_scalar_ordering() {
        let a = Fitness::from(1.0);
        let b = Fitness::from(2.0);
        assert!(a.is_better_than(&b));
        assert!(!b.is_better_than(&a));
        assert!(a.is_no_worse_than(&a.clone()));
        assert!(!a.is_better_than(&a.clone()));
    }

    #[test]
    fn test_vector_lexicographic_ordering() {
        let a = Fitness::from(vec![1.0, 9.0]);
        let b = Fitness::from(vec![1.0, 3.0]);
        let c = Fitness::from(vec![0.5, 100.0]);
        assert!(b.is_better_than(&a));
        assert!(c.is_better_than(&b));
        assert_eq!(c.primary(), 0.5);
        assert_eq!(c.objectives(), 2);
    }

    #[test]
    fn test_sentinel() {
        let worst = Fitness::worst(1);
        assert!(worst.is_sentinel());
        assert!(Fitness::from(1.0e300).is_better_than(&worst));
        assert!(worst.is_no_worse_than(&Fitness::worst(1)));

        let worst_vec = Fitness::worst(3);
        assert_eq!(worst_vec.values().len(), 3);
        assert!(worst_vec.is_sentinel());
    }

    #[test]
    fn test_validity() {
        assert!(Fitness::from(0.0).is_valid());
        assert!(!Fitness::from(f64::NAN).is_valid());
        assert!(!Fitness::Vector(vec![]).is_valid());
        assert!(!Fitness::from(vec![1.0, f64::NAN]).is_valid());
    }

    #[test]
    fn test_compare_optional() {
        let a = Fitness::from(1.0);
        assert_eq!(compare_optional(Some(&a), None), Ordering::Less);
        assert_eq!(compare_optional(None, Some(&a)), Ordering::Greater);
        assert_eq!(compare_optional(None, None), Ordering::Equal);
    }
}
