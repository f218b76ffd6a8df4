//! Engine configuration from `GEOBATCH_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use geobatch_core::RegionCode;

use crate::error::EngineError;
use crate::pacing::RowPacing;
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Everything that shapes a job's timing.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Rows per slice.
    pub batch_size: u32,
    pub retry: RetryPolicy,
    pub row_pacing: RowPacing,
    /// Delay before the continuation of an unfinished job fires.
    pub continuation_delay: Duration,
    /// Region used until one is stored.
    pub default_region: RegionCode,
    /// Per-request timeout of the lookup adapter.
    pub lookup_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry: RetryPolicy::default(),
            row_pacing: RowPacing::default(),
            continuation_delay: Duration::from_secs(60),
            default_region: RegionCode::default(),
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the process environment, then validated.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let millis = |name: &str, default: Duration| -> Result<Duration, EngineError> {
            parse_var(name, var(name), default.as_millis() as u64).map(Duration::from_millis)
        };
        let secs = |name: &str, default: Duration| -> Result<Duration, EngineError> {
            parse_var(name, var(name), default.as_secs()).map(Duration::from_secs)
        };

        let retry = RetryPolicy {
            max_attempts: parse_var(
                "GEOBATCH_MAX_ATTEMPTS",
                var("GEOBATCH_MAX_ATTEMPTS"),
                defaults.retry.max_attempts,
            )?,
            max_cooldowns: parse_var(
                "GEOBATCH_MAX_COOLDOWNS",
                var("GEOBATCH_MAX_COOLDOWNS"),
                defaults.retry.max_cooldowns,
            )?,
            cooldown: millis("GEOBATCH_COOLDOWN_MS", defaults.retry.cooldown)?,
            fault_pause: millis("GEOBATCH_FAULT_PAUSE_MS", defaults.retry.fault_pause)?,
            strategy: match var("GEOBATCH_FAULT_BACKOFF") {
                Some(raw) => raw.parse::<BackoffStrategy>().map_err(|e| {
                    EngineError::configuration(format!("GEOBATCH_FAULT_BACKOFF: {e}"))
                })?,
                None => defaults.retry.strategy,
            },
            ..defaults.retry.clone()
        };

        let row_pacing = RowPacing {
            nominal: millis("GEOBATCH_ROW_PAUSE_MS", defaults.row_pacing.nominal)?,
            jitter: parse_var(
                "GEOBATCH_ROW_JITTER",
                var("GEOBATCH_ROW_JITTER"),
                defaults.row_pacing.jitter,
            )?,
        };

        let default_region = match var("GEOBATCH_DEFAULT_REGION") {
            Some(raw) => raw.parse()?,
            None => defaults.default_region.clone(),
        };

        let config = Self {
            batch_size: parse_var(
                "GEOBATCH_BATCH_SIZE",
                var("GEOBATCH_BATCH_SIZE"),
                defaults.batch_size,
            )?,
            retry,
            row_pacing,
            continuation_delay: secs(
                "GEOBATCH_CONTINUATION_DELAY_SECS",
                defaults.continuation_delay,
            )?,
            default_region,
            lookup_timeout: secs("GEOBATCH_LOOKUP_TIMEOUT_SECS", defaults.lookup_timeout)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_size == 0 {
            return Err(EngineError::configuration("batch size must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::configuration("max attempts must be greater than 0"));
        }
        if !(0.0..1.0).contains(&self.row_pacing.jitter) {
            return Err(EngineError::configuration(format!(
                "row jitter must be in [0, 1), got {}",
                self.row_pacing.jitter
            )));
        }
        if self.retry.fault_pause < self.row_pacing.nominal {
            return Err(EngineError::configuration(format!(
                "fault pause ({:?}) must not be shorter than the row pause ({:?})",
                self.retry.fault_pause, self.row_pacing.nominal
            )));
        }
        if self.lookup_timeout.is_zero() {
            return Err(EngineError::configuration("lookup timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Upper bound on one slice: every row at its worst case plus the
    /// longest pause between rows.
    pub fn worst_case_slice(&self) -> Duration {
        let rows = self.batch_size.max(1);
        let per_row = self.retry.worst_case_row_latency(self.lookup_timeout);
        per_row.saturating_mul(rows) + self.row_pacing.max_pause().saturating_mul(rows - 1)
    }
}

fn parse_var<T>(name: &str, raw: Option<String>, default: T) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| EngineError::configuration(format!("{name}={raw}: {e}"))),
        None => Ok(default),
    }
}
