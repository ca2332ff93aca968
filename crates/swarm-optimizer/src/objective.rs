//! Objective function contract and benchmark objectives

use crate::bounds::Bounds;
use crate::fitness::Fitness;
use async_trait::async_trait;
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

/// Error an objective reports when it cannot produce a fitness
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Evaluation could not complete
    #[error("Evaluation failed: {reason}")]
    Failed {
        /// Why
        reason: String,
    },
}

impl EvaluationError {
    /// Convenience constructor
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Reason text
    pub fn reason(&self) -> &str {
        match self {
            Self::Failed { reason } => reason,
        }
    }
}

/// Function being minimised.
///
/// Implementations must be side-effect free from the engine's point of
/// view: the same candidate always yields the same fitness, and calls may
/// run concurrently from several tasks.
#[async_trait]
pub trait ObjectiveFunction: Send + Sync {
    /// Name used in logs and results
    fn name(&self) -> &str;

    /// Declared search space
    fn bounds(&self) -> &Bounds;

    /// Problem dimensionality
    fn dimensions(&self) -> usize {
        self.bounds().dimensions()
    }

    /// Number of objectives (1 for scalar fitness)
    fn objectives(&self) -> usize {
        1
    }

    /// Compute the fitness of a candidate
    async fn evaluate(&self, candidate: &[f64]) -> Result<Fitness, EvaluationError>;
}

type ObjectiveFn = dyn Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync;

/// Objective backed by a plain closure
pub struct FnObjective {
    name: String,
    bounds: Bounds,
    func: Box<ObjectiveFn>,
}

impl FnObjective {
    /// Wrap a closure; closure errors surface as `EvaluationError::Failed`
    pub fn new<F>(name: impl Into<String>, bounds: Bounds, func: F) -> Self
    where
        F: Fn(&[f64]) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            bounds,
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObjective")
            .field("name", &self.name)
            .field("bounds", &self.bounds)
            .finish()
    }
}

#[async_trait]
impl ObjectiveFunction for FnObjective {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    async fn evaluate(&self, candidate: &[f64]) -> Result<Fitness, EvaluationError> {
        (self.func)(candidate)
            .map(Fitness::Scalar)
            .map_err(|e| EvaluationError::failed(e.to_string()))
    }
}

/// `f(x) = Σ xᵢ²`, minimum 0 at the origin
#[derive(Debug, Clone)]
pub struct Sphere {
    bounds: Bounds,
}

impl Sphere {
    /// Sphere over the given bounds
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }
}

#[async_trait]
impl ObjectiveFunction for Sphere {
    fn name(&self) -> &str {
        "sphere"
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    async fn evaluate(&self, candidate: &[f64]) -> Result<Fitness, EvaluationError> {
        Ok(Fitness::Scalar(candidate.iter().map(|x| x * x).sum()))
    }
}

/// Rastrigin function, highly multimodal, minimum 0 at the origin
#[derive(Debug, Clone)]
pub struct Rastrigin {
    bounds: Bounds,
}

impl Rastrigin {
    /// Rastrigin over the given bounds (conventionally [-5.12, 5.12])
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }
}

#[async_trait]
impl ObjectiveFunction for Rastrigin {
    fn name(&self) -> &str {
        "rastrigin"
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    async fn evaluate(&self, candidate: &[f64]) -> Result<Fitness, EvaluationError> {
        let n = candidate.len() as f64;
        let sum: f64 = candidate
            .iter()
            .map(|x| x * x - 10.0 * (2.0 * PI * x).cos())
            .sum();
        Ok(Fitness::Scalar(10.0 * n + sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_sphere() {
        let sphere = Sphere::new(Bounds::uniform(2, -5.0, 5.0).unwrap());
        let fitness = sphere.evaluate(&[3.0, 4.0]).await.unwrap();
        assert_eq!(fitness, Fitness::Scalar(25.0));
        assert_eq!(sphere.dimensions(), 2);
        assert_eq!(sphere.objectives(), 1);
    }

    #[tokio::test]
    async fn test_rastrigin_minimum() {
        let rastrigin = Rastrigin::new(Bounds::uniform(3, -5.12, 5.12).unwrap());
        let fitness = rastrigin.evaluate(&[0.0, 0.0, 0.0]).await.unwrap();
        assert_relative_eq!(fitness.primary(), 0.0, epsilon = 1e-12);

        let away = rastrigin.evaluate(&[1.0, 0.0, 0.0]).await.unwrap();
        assert_relative_eq!(away.primary(), 1.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_fn_objective_error_mapping() {
        let objective = FnObjective::new("failing", Bounds::uniform(1, 0.0, 1.0).unwrap(), |_| {
            anyhow::bail!("market data unavailable")
        });
        let err = objective.evaluate(&[0.5]).await.unwrap_err();
        assert_eq!(err.reason(), "market data unavailable");
    }
}
