//! Configuration for the optimization scheduler

use crate::error::{OptimizerError, OptimizerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Scheduler-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Jobs allowed to run at once; further jobs wait in `Created`
    pub max_concurrent_jobs: usize,
    /// Capacity of each job's progress channel
    pub progress_buffer: usize,
    /// Log progress at info level every N generations
    pub log_interval: u64,
    /// Evaluation policy for jobs that do not override it
    pub default_evaluation: EvaluationPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            progress_buffer: 64,
            log_interval: 10,
            default_evaluation: EvaluationPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(OptimizerError::invalid_configuration(
                "max_concurrent_jobs must be greater than 0",
            ));
        }

        if self.progress_buffer == 0 {
            return Err(OptimizerError::invalid_configuration(
                "progress_buffer must be greater than 0",
            ));
        }

        if self.log_interval == 0 {
            return Err(OptimizerError::invalid_configuration(
                "log_interval must be greater than 0",
            ));
        }

        self.default_evaluation.validate()
    }

    /// Load and validate a JSON configuration file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> OptimizerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a builder for the configuration
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }
}

/// Builder for SchedulerConfig
#[derive(Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Set the concurrent job cap
    pub fn max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.config.max_concurrent_jobs = jobs;
        self
    }

    /// Set the progress channel capacity
    pub fn progress_buffer(mut self, capacity: usize) -> Self {
        self.config.progress_buffer = capacity;
        self
    }

    /// Set the info-level logging interval
    pub fn log_interval(mut self, generations: u64) -> Self {
        self.config.log_interval = generations;
        self
    }

    /// Set the default evaluation policy
    pub fn default_evaluation(mut self, policy: EvaluationPolicy) -> Self {
        self.config.default_evaluation = policy;
        self
    }

    /// Build the configuration
    pub fn build(self) -> OptimizerResult<SchedulerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// How candidate evaluations are run and retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationPolicy {
    /// Evaluations in flight at once within a generation
    pub concurrency_limit: usize,
    /// Retries of a single failed evaluation
    pub max_retries: u32,
    /// Base backoff between retries, doubled on each attempt
    pub retry_backoff_ms: u64,
    /// Fail the job instead of assigning the sentinel fitness
    pub strict: bool,
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        Self {
            concurrency_limit: 16,
            max_retries: 2,
            retry_backoff_ms: 10,
            strict: false,
        }
    }
}

impl EvaluationPolicy {
    /// Validate the policy
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.concurrency_limit == 0 {
            return Err(OptimizerError::invalid_configuration(
                "evaluation concurrency_limit must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 8);
        assert_eq!(config.log_interval, 10);
        assert!(!config.default_evaluation.strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SchedulerConfig::default();
        config.max_concurrent_jobs = 0;
        assert!(config.validate().is_err());

        config.max_concurrent_jobs = 2;
        config.progress_buffer = 0;
        assert!(config.validate().is_err());

        config.progress_buffer = 4;
        config.default_evaluation.concurrency_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(OptimizerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = SchedulerConfig::builder()
            .max_concurrent_jobs(2)
            .progress_buffer(16)
            .log_interval(5)
            .default_evaluation(EvaluationPolicy {
                strict: true,
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.progress_buffer, 16);
        assert_eq!(config.log_interval, 5);
        assert!(config.default_evaluation.strict);

        assert!(SchedulerConfig::builder().log_interval(0).build().is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = EvaluationPolicy {
            retry_backoff_ms: 10,
            ..Default::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "max_concurrent_jobs": 3, "default_evaluation": {{ "strict": true }} }}"#
        )
        .unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.progress_buffer, 64);
        assert!(config.default_evaluation.strict);
        assert_eq!(config.default_evaluation.concurrency_limit, 16);
    }

    #[test]
    fn test_from_file_errors() {
        let missing = SchedulerConfig::from_file("/definitely/not/here.json");
        assert!(matches!(missing, Err(OptimizerError::Io(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            SchedulerConfig::from_file(file.path()),
            Err(OptimizerError::Serialization(_))
        ));

        let mut invalid = tempfile::NamedTempFile::new().unwrap();
        write!(invalid, r#"{{ "max_concurrent_jobs": 0 }}"#).unwrap();
        assert!(matches!(
            SchedulerConfig::from_file(invalid.path()),
            Err(OptimizerError::InvalidConfiguration { .. })
        ));
    }
}
