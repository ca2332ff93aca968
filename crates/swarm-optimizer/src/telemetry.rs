//! Tracing subscriber initialisation
//!
//! Library code only emits `tracing` events; binaries and tests that want to
//! see them call [`init_tracing`] once at startup.

use crate::error::{OptimizerError, OptimizerResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for tracing initialisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Minimum level when `RUST_LOG` is not set
    pub log_level: String,
    /// Include thread ids in formatted output
    pub with_thread_ids: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            with_thread_ids: false,
        }
    }
}

impl TracingConfig {
    /// Validate the configured level
    pub fn validate(&self) -> OptimizerResult<()> {
        if !VALID_LEVELS.contains(&self.log_level.as_str()) {
            return Err(OptimizerError::invalid_configuration(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                VALID_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

/// Install a global fmt subscriber filtered by `RUST_LOG` or the configured level.
///
/// Succeeds at most once per process; later calls return `Telemetry`.
pub fn init_tracing(config: TracingConfig) -> OptimizerResult<()> {
    config.validate()?;

    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(OptimizerError::Telemetry {
            message: "tracing has already been initialized".to_string(),
        });
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_thread_ids(config.with_thread_ids),
        )
        .try_init()
        .map_err(|e| OptimizerError::Telemetry {
            message: format!("failed to initialize tracing: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_validation() {
        assert!(TracingConfig::default().validate().is_ok());
        let bad = TracingConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("verbose"));
        assert!(init_tracing(bad).is_err());
    }

    #[test]
    fn test_second_init_is_rejected() {
        // The first call may lose to another test in this binary
        let _ = init_tracing(TracingConfig::default());
        let second = init_tracing(TracingConfig::default());
        assert!(matches!(second, Err(OptimizerError::Telemetry { .. })));
    }
}
