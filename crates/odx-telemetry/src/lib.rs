// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-telemetry
//!
//! Tracing initialisation and a small set of process-wide counters.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber from the configured level.
///
/// `RUST_LOG` takes precedence when set, so operators can raise verbosity
/// per-target without a config change.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("odx={level},orderdesk={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Snapshot of the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CaseCountersSnapshot {
    /// Cases started.
    pub started: u64,
    /// Cases that reached `draft-created`.
    pub drafts_created: u64,
    /// Duplicate draft requests answered from the fingerprint store.
    pub duplicates: u64,
    /// Cases cancelled.
    pub cancelled: u64,
    /// Cases failed.
    pub failed: u64,
}

/// Monotonic counters for the daemon's health surface.
#[derive(Debug, Default)]
pub struct CaseCounters {
    started: AtomicU64,
    drafts_created: AtomicU64,
    duplicates: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

impl CaseCounters {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A case was started.
    pub fn case_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// A draft was created.
    pub fn draft_created(&self) {
        self.drafts_created.fetch_add(1, Ordering::Relaxed);
    }

    /// A duplicate draft request was answered.
    pub fn duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// A case was cancelled.
    pub fn case_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A case failed.
    pub fn case_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters at once.
    pub fn snapshot(&self) -> CaseCountersSnapshot {
        CaseCountersSnapshot {
            started: self.started.load(Ordering::Relaxed),
            drafts_created: self.drafts_created.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = CaseCounters::new();
        counters.case_started();
        counters.case_started();
        counters.draft_created();
        counters.duplicate();
        let snap = counters.snapshot();
        assert_eq!(snap.started, 2);
        assert_eq!(snap.drafts_created, 1);
        assert_eq!(snap.duplicates, 1);
        assert_eq!(snap.cancelled, 0);
    }
}
