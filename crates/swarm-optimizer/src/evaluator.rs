//! Concurrent candidate evaluation
//!
//! Every unevaluated candidate of a generation is evaluated on its own task,
//! bounded by a semaphore. Results are written back by slot index, so the
//! order in which evaluations complete never influences the next generation.

use crate::config::EvaluationPolicy;
use crate::error::{OptimizerError, OptimizerResult};
use crate::fitness::Fitness;
use crate::objective::ObjectiveFunction;
use crate::population::Population;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Cumulative evaluation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStats {
    /// Objective calls, retries included
    pub attempts: u64,
    /// Objective calls that failed or returned an invalid fitness
    pub failed_attempts: u64,
    /// Candidates that ended with the sentinel fitness
    pub sentinel_assignments: u64,
}

struct EvaluationOutcome {
    result: Result<Fitness, String>,
    attempts: u64,
    failed_attempts: u64,
}

/// Evaluates candidates against one objective under one policy
pub struct Evaluator {
    objective: Arc<dyn ObjectiveFunction>,
    policy: EvaluationPolicy,
    permits: Arc<Semaphore>,
    attempts: AtomicU64,
    failed_attempts: AtomicU64,
    sentinel_assignments: AtomicU64,
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("objective", &self.objective.name())
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Evaluator {
    /// Create an evaluator
    pub fn new(objective: Arc<dyn ObjectiveFunction>, policy: EvaluationPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.concurrency_limit.max(1)));
        Self {
            objective,
            policy,
            permits,
            attempts: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            sentinel_assignments: AtomicU64::new(0),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> EvaluationStats {
        EvaluationStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            sentinel_assignments: self.sentinel_assignments.load(Ordering::Relaxed),
        }
    }

    /// Compute fitness for every unevaluated candidate of the population.
    ///
    /// Already evaluated candidates are left untouched. Returns only after
    /// every spawned evaluation has finished.
    pub async fn evaluate_population(&self, mut population: Population) -> OptimizerResult<Population> {
        let pending = population.unevaluated_indices();
        if pending.is_empty() {
            return Ok(population);
        }

        let positions: Vec<Vec<f64>> = pending
            .iter()
            .map(|&idx| population.candidates()[idx].position().to_vec())
            .collect();
        let fitness = self.evaluate_batch(positions).await?;

        let candidates = population.candidates_mut();
        for (idx, value) in pending.into_iter().zip(fitness) {
            candidates[idx].set_fitness(value);
        }
        Ok(population)
    }

    /// Evaluate raw positions concurrently; output order matches input order
    pub async fn evaluate_batch(&self, positions: Vec<Vec<f64>>) -> OptimizerResult<Vec<Fitness>> {
        let dimensions = self.objective.dimensions();
        for position in &positions {
            if position.len() != dimensions {
                return Err(OptimizerError::DimensionMismatch {
                    expected: dimensions,
                    actual: position.len(),
                });
            }
        }

        let objectives = self.objective.objectives();
        let handles: Vec<_> = positions
            .into_iter()
            .map(|position| {
                let objective = Arc::clone(&self.objective);
                let permits = Arc::clone(&self.permits);
                let policy = self.policy.clone();
                tokio::spawn(async move {
                    evaluate_with_retry(objective, permits, policy, objectives, position).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut first_failure: Option<String> = None;

        for joined in join_all(handles).await {
            let outcome = joined.map_err(|e| OptimizerError::EvaluationFailed {
                reason: format!("evaluation task aborted: {e}"),
            })?;

            self.attempts.fetch_add(outcome.attempts, Ordering::Relaxed);
            self.failed_attempts
                .fetch_add(outcome.failed_attempts, Ordering::Relaxed);

            match outcome.result {
                Ok(fitness) => results.push(fitness),
                Err(reason) => {
                    if first_failure.is_none() {
                        first_failure = Some(reason);
                    }
                    self.sentinel_assignments.fetch_add(1, Ordering::Relaxed);
                    results.push(Fitness::worst(objectives));
                }
            }
        }

        if let Some(reason) = first_failure {
            if self.policy.strict {
                return Err(OptimizerError::EvaluationFailed { reason });
            }
            warn!(
                objective = self.objective.name(),
                reason = %reason,
                "evaluation retries exhausted, assigning sentinel fitness"
            );
        }

        Ok(results)
    }
}

async fn evaluate_with_retry(
    objective: Arc<dyn ObjectiveFunction>,
    permits: Arc<Semaphore>,
    policy: EvaluationPolicy,
    objectives: usize,
    position: Vec<f64>,
) -> EvaluationOutcome {
    let mut attempts = 0;
    let mut failed_attempts = 0;
    let mut last_error = String::new();

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }

        let result = {
            let _permit = match permits.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return EvaluationOutcome {
                        result: Err(format!("evaluation permits closed: {e}")),
                        attempts,
                        failed_attempts,
                    }
                }
            };
            objective.evaluate(&position).await
        };
        attempts += 1;

        match result {
            Ok(fitness) if fitness.is_valid() && fitness.objectives() == objectives => {
                return EvaluationOutcome {
                    result: Ok(fitness),
                    attempts,
                    failed_attempts,
                };
            }
            Ok(fitness) => {
                last_error = format!(
                    "objective returned invalid fitness {:?} (expected {} finite objective values)",
                    fitness.values(),
                    objectives
                );
            }
            Err(e) => last_error = e.reason().to_string(),
        }

        failed_attempts += 1;
        debug!(attempt, error = %last_error, "evaluation attempt failed");
    }

    EvaluationOutcome {
        result: Err(last_error),
        attempts,
        failed_attempts,
    }
}
