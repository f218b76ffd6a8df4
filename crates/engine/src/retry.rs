//! Per-row retry and backoff policy.
//!
//! Two independent budgets apply to one row: faults (transport errors,
//! timeouts, garbled payloads) and rate-limit cooldowns. Neither is ever
//! unbounded, so a slice always has a finite worst case.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification of one lookup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    Success,
    /// The service asked us to slow down (`OVER_QUERY_LIMIT`).
    RateLimited,
    /// No service answer was obtained.
    TransientError,
    /// A definitive non-OK answer (`ZERO_RESULTS`, `REQUEST_DENIED`, ...).
    PermanentError,
}

/// What the caller should do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded.
    Done,
    RetryNow,
    RetryAfter(Duration),
    /// Stop and record the last attempt as the row's outcome.
    GiveUp,
}

/// Attempts consumed so far for one row. Starts at zero for every row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptBudget {
    pub faults: u32,
    pub cooldowns: u32,
}

/// How fault pauses grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same pause every time.
    #[default]
    Fixed,
    /// base * 2^(fault - 1)
    Exponential,
    /// base * fault
    Linear,
}

impl core::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            other => Err(format!("unknown backoff strategy '{other}'")),
        }
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls allowed for a row that keeps faulting (1 = no retry).
    pub max_attempts: u32,
    /// Rate-limit cooldowns allowed per row (0 = give up on first limit).
    pub max_cooldowns: u32,
    /// Wait after a rate-limit answer.
    pub cooldown: Duration,
    /// Base wait after a fault.
    pub fault_pause: Duration,
    /// Cap for grown fault pauses.
    pub max_fault_pause: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_cooldowns: 3,
            cooldown: Duration::from_secs(5),
            fault_pause: Duration::from_secs(2),
            max_fault_pause: Duration::from_secs(30),
            strategy: BackoffStrategy::Fixed,
        }
    }
}

impl RetryPolicy {
    /// One call per row, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            max_cooldowns: 0,
            ..Default::default()
        }
    }

    /// Classify the attempt into `budget` and decide the next step.
    pub fn decide(&self, budget: &mut AttemptBudget, class: AttemptClass) -> RetryDecision {
        match class {
            AttemptClass::Success => RetryDecision::Done,
            AttemptClass::PermanentError => RetryDecision::GiveUp,
            AttemptClass::RateLimited => {
                if budget.cooldowns >= self.max_cooldowns {
                    return RetryDecision::GiveUp;
                }
                budget.cooldowns += 1;
                wait_or_now(self.cooldown)
            }
            AttemptClass::TransientError => {
                budget.faults += 1;
                if budget.faults >= self.max_attempts.max(1) {
                    return RetryDecision::GiveUp;
                }
                wait_or_now(self.fault_pause_for(budget.faults))
            }
        }
    }

    /// Pause after the `fault`-th fault (1-indexed).
    pub fn fault_pause_for(&self, fault: u32) -> Duration {
        if fault == 0 {
            return Duration::ZERO;
        }
        let grown = match self.strategy {
            BackoffStrategy::Fixed => self.fault_pause,
            BackoffStrategy::Linear => self.fault_pause.saturating_mul(fault),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(fault - 1);
                self.fault_pause.saturating_mul(factor)
            }
        };
        grown.min(self.max_fault_pause.max(self.fault_pause))
    }

    /// Most service calls one row can make.
    pub fn max_calls_per_row(&self) -> u32 {
        self.max_attempts.max(1) + self.max_cooldowns
    }

    /// Most waiting one row can do between its calls.
    pub fn max_wait_per_row(&self) -> Duration {
        let faults: Duration = (1..self.max_attempts.max(1))
            .map(|f| self.fault_pause_for(f))
            .sum();
        faults + self.cooldown.saturating_mul(self.max_cooldowns)
    }

    /// Upper bound on the time one row can take when every call hangs until
    /// `lookup_timeout`.
    pub fn worst_case_row_latency(&self, lookup_timeout: Duration) -> Duration {
        lookup_timeout.saturating_mul(self.max_calls_per_row()) + self.max_wait_per_row()
    }
}

fn wait_or_now(delay: Duration) -> RetryDecision {
    if delay.is_zero() {
        RetryDecision::RetryNow
    } else {
        RetryDecision::RetryAfter(delay)
    }
}
