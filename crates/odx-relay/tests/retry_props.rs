// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for retry-queue monotonicity.

use odx_relay::{MemoryRetryQueue, NewRetryItem, RetryQueue, RetryStatus};
use odx_retry::RetryPolicy;
use proptest::prelude::*;
use std::time::Duration;
use uuid::Uuid;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_secs(60))
        .multiplier(2.0)
        .max_delay(Duration::from_secs(3600))
        .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Across any failure sequence, `attempt_count` never decreases and
    /// `next_retry_at` strictly increases until the backoff cap.
    #[test]
    fn attempts_monotone_and_delays_grow(failures in 1u32..8) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let queue = MemoryRetryQueue::new();
            let item = queue
                .enqueue(NewRetryItem {
                    case_id: Uuid::from_u128(1),
                    payload: serde_json::json!({}),
                    fingerprint: "fp".into(),
                    max_retries: failures + 1,
                    initial_delay: Duration::ZERO,
                })
                .await
                .unwrap();

            let mut last_attempts = 0u32;
            let mut last_due = item.next_retry_at;
            for i in 0..failures {
                let claimed = queue.mark_in_progress(item.id).await.unwrap();
                prop_assert!(claimed.attempt_count > last_attempts);
                last_attempts = claimed.attempt_count;

                let failed = queue
                    .mark_failed(item.id, &format!("fail {i}"), &policy(failures + 1))
                    .await
                    .unwrap();
                prop_assert_eq!(failed.status, RetryStatus::Pending);
                prop_assert!(failed.next_retry_at > last_due);
                last_due = failed.next_retry_at;
                prop_assert_eq!(failed.error_history.len(), (i + 1) as usize);
            }
            Ok(())
        })?;
    }
}
