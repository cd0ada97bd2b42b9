// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry policies and timeout configuration.
//!
//! A [`RetryPolicy`] describes a bounded exponential backoff:
//! `delay(n) = min(initial × multiplier^n, cap)`. The same policy type
//! drives workflow activity retries, accounting-client calls, and the
//! retry-queue reschedule computation, so backoff behaviour is uniform
//! across the system.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// A bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied per retry.
    pub multiplier: f64,
    /// Upper bound on any single delay. `None` means uncapped.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            multiplier: 2.0,
            max_delay: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// Start building a policy.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: None,
        }
    }

    /// Delay to wait after the given zero-based failed attempt.
    ///
    /// `delay_for(0)` is the delay between the first failure and the first
    /// retry. The result grows geometrically and is clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(63) as i32);
        let raw = self.initial_delay.as_secs_f64() * factor;
        let capped = match self.max_delay {
            Some(cap) => raw.min(cap.as_secs_f64()),
            None => raw,
        };
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// `true` if another attempt is allowed after `attempts` tries.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Run an async operation under this policy.
    ///
    /// `is_retryable` classifies errors; a non-retryable error aborts
    /// immediately. The last error is returned once attempts are exhausted.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !is_retryable(&err) || !self.allows_retry(attempt) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after failure");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Fluent builder for [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    policy: Option<RetryPolicy>,
}

impl RetryPolicyBuilder {
    fn policy(&mut self) -> &mut RetryPolicy {
        self.policy.get_or_insert_with(RetryPolicy::default)
    }

    /// Set the maximum number of attempts (including the first).
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy().max_attempts = attempts.max(1);
        self
    }

    /// Set the delay before the first retry.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy().initial_delay = delay;
        self
    }

    /// Set the per-retry multiplier.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy().multiplier = if multiplier < 1.0 { 1.0 } else { multiplier };
        self
    }

    /// Cap individual delays.
    #[must_use]
    pub fn max_delay(mut self, cap: Duration) -> Self {
        self.policy().max_delay = Some(cap);
        self
    }

    /// Remove the delay cap.
    #[must_use]
    pub fn uncapped(mut self) -> Self {
        self.policy().max_delay = None;
        self
    }

    /// Finish building.
    pub fn build(mut self) -> RetryPolicy {
        *self.policy()
    }
}

// ---------------------------------------------------------------------------
// TimeoutConfig
// ---------------------------------------------------------------------------

/// Execution-time bounds for a workflow activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Bound on a single execution.
    pub start_to_close: Duration,
    /// Bound on the total including retries.
    pub schedule_to_close: Duration,
    /// Heartbeat interval required for long activities, when set.
    pub heartbeat: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(60),
            schedule_to_close: Duration::from_secs(300),
            heartbeat: None,
        }
    }
}

impl TimeoutConfig {
    /// Config for long activities (> 60 s) which must heartbeat.
    ///
    /// The heartbeat timeout is fixed at five minutes.
    pub fn long_running(start_to_close: Duration, schedule_to_close: Duration) -> Self {
        Self {
            start_to_close,
            schedule_to_close,
            heartbeat: Some(Duration::from_secs(300)),
        }
    }
}
