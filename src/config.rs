use std::time::Duration;

use crate::{
    detect::DetectionStyle,
    foundation::core::Canvas,
    foundation::error::RefitResult,
    oracle::RetryPolicy,
};

/// Per-attempt oracle deadline override, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "REFIT_ORACLE_TIMEOUT_SECS";
/// Oracle attempt budget override.
pub const ENV_MAX_ATTEMPTS: &str = "REFIT_ORACLE_MAX_ATTEMPTS";
/// Base backoff override, in milliseconds.
pub const ENV_BACKOFF_MS: &str = "REFIT_ORACLE_BACKOFF_MS";

/// Settings for one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Output canvas; always explicit.
    pub target: Canvas,
    /// Oracle deadline and backoff.
    pub retry: RetryPolicy,
    /// Detection overlay look.
    pub detection: DetectionStyle,
}

impl PipelineConfig {
    /// Default retry and detection settings for the given target.
    pub fn new(target: Canvas) -> Self {
        Self {
            target,
            retry: RetryPolicy::default(),
            detection: DetectionStyle::default(),
        }
    }

    /// Check every section.
    pub fn validate(&self) -> RefitResult<()> {
        self.target.validate()?;
        self.retry.validate()?;
        self.detection.validate()
    }

    /// Apply `REFIT_ORACLE_*` overrides found through `lookup`. Unparseable or zero values are
    /// ignored.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let positive = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|&v| v > 0)
        };
        if let Some(secs) = positive(ENV_TIMEOUT_SECS) {
            self.retry.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = positive(ENV_MAX_ATTEMPTS).and_then(|n| u32::try_from(n).ok()) {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = lookup(ENV_BACKOFF_MS).and_then(|v| v.trim().parse::<u64>().ok()) {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        self
    }

    /// [`Self::apply_overrides`] against the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
