// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-activity retry policies.
//!
//! All activities are idempotent, so retrying is always safe. Draft
//! creation gets a single workflow-level attempt; the accounting client
//! owns its own retries and the queue handoff.

use odx_retry::{RetryPolicy, TimeoutConfig};
use std::time::Duration;

/// Store-file activity: 3 attempts, 5 s initial, 2×, capped at 1 min.
pub fn store_file() -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(3)
        .initial_delay(Duration::from_secs(5))
        .multiplier(2.0)
        .max_delay(Duration::from_secs(60))
        .build()
}

/// Parse activity: same shape as store-file.
pub fn parse() -> RetryPolicy {
    store_file()
}

/// Committee activity: 5 attempts, uncapped growth; the committee call is
/// long and its failures are usually worth waiting out.
pub fn committee() -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(5)
        .initial_delay(Duration::from_secs(5))
        .multiplier(2.0)
        .uncapped()
        .build()
}

/// Customer/item resolution: 3 attempts, capped at 1 min.
pub fn resolve() -> RetryPolicy {
    store_file()
}

/// Draft creation: one attempt at this level.
pub fn create_draft() -> RetryPolicy {
    RetryPolicy::none()
}

/// User notification: 10 attempts, 10 s initial, 1.5×, capped at 5 min.
pub fn notify() -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(10)
        .initial_delay(Duration::from_secs(10))
        .multiplier(1.5)
        .max_delay(Duration::from_secs(300))
        .build()
}

/// Timeouts for the long committee call: heartbeats required.
pub fn committee_timeouts() -> TimeoutConfig {
    TimeoutConfig::long_running(Duration::from_secs(600), Duration::from_secs(3600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_the_design() {
        assert_eq!(store_file().max_attempts, 3);
        assert_eq!(store_file().delay_for(0), Duration::from_secs(5));
        assert_eq!(store_file().delay_for(5), Duration::from_secs(60));

        assert_eq!(committee().max_attempts, 5);
        assert_eq!(committee().max_delay, None);

        assert_eq!(create_draft().max_attempts, 1);

        assert_eq!(notify().max_attempts, 10);
        assert_eq!(notify().delay_for(0), Duration::from_secs(10));
        assert_eq!(notify().delay_for(1), Duration::from_secs(15));
        assert_eq!(notify().delay_for(20), Duration::from_secs(300));
    }

    #[test]
    fn committee_requires_heartbeats() {
        assert!(committee_timeouts().heartbeat.is_some());
    }
}
