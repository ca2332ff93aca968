//! Portfolio rebalancing objective
//!
//! Candidates are raw allocation scores; they are normalised into weights
//! summing to one before scoring. The objective minimises
//! `-wᵀμ + λ·wᵀΣw + c·Σ|w - w₀|`: negative expected return, plus a risk
//! penalty, plus the cost of trading away from the current allocation.

use crate::bounds::Bounds;
use crate::error::{OptimizerError, OptimizerResult};
use crate::fitness::Fitness;
use crate::objective::{EvaluationError, ObjectiveFunction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Market inputs and preferences for one rebalancing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioObjective {
    expected_returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    risk_aversion: f64,
    current_weights: Vec<f64>,
    transaction_cost: f64,
    bounds: Bounds,
}

impl PortfolioObjective {
    /// Long-only objective with each raw score in `[0, 1]` and no current holdings
    pub fn new(
        expected_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
        risk_aversion: f64,
    ) -> OptimizerResult<Self> {
        let assets = expected_returns.len();
        Self::with_rebalancing(
            expected_returns,
            covariance,
            risk_aversion,
            vec![0.0; assets],
            0.0,
        )
    }

    /// Objective that also charges `transaction_cost` per unit of weight traded away from `current_weights`
    pub fn with_rebalancing(
        expected_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
        risk_aversion: f64,
        current_weights: Vec<f64>,
        transaction_cost: f64,
    ) -> OptimizerResult<Self> {
        let assets = expected_returns.len();
        if assets == 0 {
            return Err(OptimizerError::invalid_descriptor(
                "portfolio needs at least one asset",
            ));
        }

        if covariance.len() != assets || covariance.iter().any(|row| row.len() != assets) {
            return Err(OptimizerError::DimensionMismatch {
                expected: assets,
                actual: covariance
                    .iter()
                    .map(Vec::len)
                    .find(|&len| len != assets)
                    .unwrap_or(covariance.len()),
            });
        }

        if current_weights.len() != assets {
            return Err(OptimizerError::DimensionMismatch {
                expected: assets,
                actual: current_weights.len(),
            });
        }

        let all_finite = expected_returns
            .iter()
            .chain(covariance.iter().flatten())
            .chain(current_weights.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(OptimizerError::invalid_descriptor(
                "portfolio inputs must be finite",
            ));
        }

        if !(risk_aversion >= 0.0 && risk_aversion.is_finite()) {
            return Err(OptimizerError::invalid_descriptor(format!(
                "risk aversion must be finite and non-negative, got {risk_aversion}"
            )));
        }

        if !(transaction_cost >= 0.0 && transaction_cost.is_finite()) {
            return Err(OptimizerError::invalid_descriptor(format!(
                "transaction cost must be finite and non-negative, got {transaction_cost}"
            )));
        }

        Ok(Self {
            bounds: Bounds::uniform(assets, 0.0, 1.0)?,
            expected_returns,
            covariance,
            risk_aversion,
            current_weights,
            transaction_cost,
        })
    }

    /// Number of assets
    pub fn assets(&self) -> usize {
        self.expected_returns.len()
    }

    /// Normalise raw scores into weights summing to one
    pub fn normalize(candidate: &[f64]) -> Result<Vec<f64>, EvaluationError> {
        let total: f64 = candidate.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(EvaluationError::failed(format!(
                "allocation scores must sum to a positive finite value, got {total}"
            )));
        }
        Ok(candidate.iter().map(|x| x / total).collect())
    }

    /// Expected portfolio return `wᵀμ`
    pub fn expected_return(&self, weights: &[f64]) -> f64 {
        weights
            .iter()
            .zip(&self.expected_returns)
            .map(|(w, mu)| w * mu)
            .sum()
    }

    /// Portfolio variance `wᵀΣw`
    pub fn variance(&self, weights: &[f64]) -> f64 {
        self.covariance
            .iter()
            .zip(weights)
            .map(|(row, wi)| wi * row.iter().zip(weights).map(|(c, wj)| c * wj).sum::<f64>())
            .sum()
    }

    /// Turnover `Σ|w - w₀|`
    pub fn turnover(&self, weights: &[f64]) -> f64 {
        weights
            .iter()
            .zip(&self.current_weights)
            .map(|(w, w0)| (w - w0).abs())
            .sum()
    }

    /// Score already-normalised weights
    pub fn score(&self, weights: &[f64]) -> f64 {
        -self.expected_return(weights)
            + self.risk_aversion * self.variance(weights)
            + self.transaction_cost * self.turnover(weights)
    }
}

#[async_trait]
impl ObjectiveFunction for PortfolioObjective {
    fn name(&self) -> &str {
        "portfolio-rebalancing"
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    async fn evaluate(&self, candidate: &[f64]) -> Result<Fitness, EvaluationError> {
        if candidate.len() != self.assets() {
            return Err(EvaluationError::failed(format!(
                "expected {} allocation scores, got {}",
                self.assets(),
                candidate.len()
            )));
        }
        let weights = Self::normalize(candidate)?;
        Ok(Fitness::Scalar(self.score(&weights)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_assets() -> PortfolioObjective {
        PortfolioObjective::new(
            vec![0.10, 0.05],
            vec![vec![0.04, 0.0], vec![0.0, 0.01]],
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_construction_validation() {
        assert!(PortfolioObjective::new(vec![], vec![], 1.0).is_err());
        assert!(matches!(
            PortfolioObjective::new(vec![0.1, 0.2], vec![vec![1.0, 0.0]], 1.0),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
        assert!(PortfolioObjective::new(vec![0.1], vec![vec![1.0]], -1.0).is_err());
        assert!(PortfolioObjective::with_rebalancing(
            vec![0.1],
            vec![vec![1.0]],
            1.0,
            vec![0.5, 0.5],
            0.01
        )
        .is_err());
    }

    #[test]
    fn test_normalize() {
        let weights = PortfolioObjective::normalize(&[1.0, 3.0]).unwrap();
        assert_relative_eq!(weights[0], 0.25);
        assert_relative_eq!(weights[1], 0.75);
        assert!(PortfolioObjective::normalize(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_score_components() {
        let objective = two_assets();
        let weights = [0.5, 0.5];
        assert_relative_eq!(objective.expected_return(&weights), 0.075);
        assert_relative_eq!(objective.variance(&weights), 0.0125);
        assert_relative_eq!(objective.score(&weights), -0.075 + 0.0125);
    }

    #[test]
    fn test_transaction_cost_penalises_turnover() {
        let objective = PortfolioObjective::with_rebalancing(
            vec![0.10, 0.05],
            vec![vec![0.04, 0.0], vec![0.0, 0.01]],
            1.0,
            vec![1.0, 0.0],
            0.1,
        )
        .unwrap();
        assert_relative_eq!(objective.turnover(&[1.0, 0.0]), 0.0);
        assert_relative_eq!(objective.turnover(&[0.5, 0.5]), 1.0);
        assert_relative_eq!(
            objective.score(&[0.5, 0.5]),
            -0.075 + 0.0125 + 0.1
        );
    }

    #[tokio::test]
    async fn test_evaluate_scales_scores() {
        let objective = two_assets();
        let a = objective.evaluate(&[0.2, 0.2]).await.unwrap();
        let b = objective.evaluate(&[0.9, 0.9]).await.unwrap();
        assert_relative_eq!(a.primary(), b.primary(), epsilon = 1e-12);
        assert!(objective.evaluate(&[0.0, 0.0]).await.is_err());
        assert_eq!(objective.dimensions(), 2);
    }
}
