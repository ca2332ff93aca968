//! Run metrics tracking

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Metrics for one optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Generations completed
    pub generations: u64,
    /// Objective evaluations performed, retries included
    pub total_evaluations: u64,
    /// Failed evaluation attempts
    pub failed_evaluations: u64,
    /// Best-so-far primary fitness
    pub best_fitness: f64,
    /// Average primary fitness of the latest generation
    pub average_fitness: f64,
    /// Diversity of the latest generation
    pub diversity: f64,
    /// Wall time since the run started
    pub elapsed: Duration,
    /// Per-generation history
    pub history: PerformanceHistory,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self {
            generations: 0,
            total_evaluations: 0,
            failed_evaluations: 0,
            best_fitness: f64::MAX,
            average_fitness: f64::MAX,
            diversity: 0.0,
            elapsed: Duration::ZERO,
            history: PerformanceHistory::default(),
        }
    }
}

/// Performance history tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceHistory {
    /// Best-so-far fitness per generation
    pub best_fitness_history: Vec<f64>,
    /// Average fitness per generation
    pub average_fitness_history: Vec<f64>,
    /// Diversity per generation
    pub diversity_history: Vec<f64>,
    /// Generation times
    pub generation_times: Vec<Duration>,
}

impl PerformanceHistory {
    /// Add generation data
    pub fn add_generation(
        &mut self,
        best_fitness: f64,
        average_fitness: f64,
        diversity: f64,
        generation_time: Duration,
    ) {
        self.best_fitness_history.push(best_fitness);
        self.average_fitness_history.push(average_fitness);
        self.diversity_history.push(diversity);
        self.generation_times.push(generation_time);
    }

    /// Relative reduction of the best fitness over the last `window` generations
    pub fn improvement_rate(&self, window: usize) -> f64 {
        let len = self.best_fitness_history.len();
        if window == 0 || len < window + 1 {
            return 0.0;
        }

        let first = self.best_fitness_history[len - window - 1];
        let last = self.best_fitness_history[len - 1];

        if first == 0.0 || first == f64::MAX {
            return 0.0;
        }

        (first - last) / first.abs()
    }
}

/// Collects metrics generation by generation
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    generation_start: Instant,
    metrics: RunMetrics,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create new metrics collector
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            generation_start: now,
            metrics: RunMetrics::default(),
        }
    }

    /// Count evaluation attempts, successful or not
    pub fn record_evaluations(&mut self, attempts: u64, failures: u64) {
        self.metrics.total_evaluations += attempts;
        self.metrics.failed_evaluations += failures;
    }

    /// Close the current generation and start timing the next one
    pub fn end_generation(&mut self, best_fitness: f64, average_fitness: f64, diversity: f64) {
        let generation_time = self.generation_start.elapsed();

        self.metrics.generations += 1;
        self.metrics.best_fitness = best_fitness;
        self.metrics.average_fitness = average_fitness;
        self.metrics.diversity = diversity;
        self.metrics.elapsed = self.start_time.elapsed();
        self.metrics
            .history
            .add_generation(best_fitness, average_fitness, diversity, generation_time);

        self.generation_start = Instant::now();
    }

    /// Wall time since the collector was created
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Current metrics
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Consume the collector, stamping the final elapsed time
    pub fn finish(mut self) -> RunMetrics {
        self.metrics.elapsed = self.start_time.elapsed();
        self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_collector_records_generations() {
        let mut collector = MetricsCollector::new();
        collector.record_evaluations(20, 1);
        collector.end_generation(10.0, 15.0, 0.3);
        collector.record_evaluations(20, 0);
        collector.end_generation(5.0, 8.0, 0.2);

        let metrics = collector.finish();
        assert_eq!(metrics.generations, 2);
        assert_eq!(metrics.total_evaluations, 40);
        assert_eq!(metrics.failed_evaluations, 1);
        assert_eq!(metrics.best_fitness, 5.0);
        assert_eq!(metrics.history.best_fitness_history, vec![10.0, 5.0]);
        assert_eq!(metrics.history.diversity_history, vec![0.3, 0.2]);
        assert_eq!(metrics.history.generation_times.len(), 2);
    }

    #[test]
    fn test_improvement_rate() {
        let mut history = PerformanceHistory::default();
        assert_eq!(history.improvement_rate(2), 0.0);

        for best in [10.0, 8.0, 5.0] {
            history.add_generation(best, best, 0.0, Duration::ZERO);
        }
        assert_relative_eq!(history.improvement_rate(2), 0.5);
        assert_relative_eq!(history.improvement_rate(1), 0.375);
        assert_eq!(history.improvement_rate(3), 0.0);
    }
}
