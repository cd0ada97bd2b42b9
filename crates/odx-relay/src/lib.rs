// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-relay
//!
//! The reliability layer between the workflow and the outside world: a
//! persistent-semantics retry queue drained by a per-case-serial sweeper,
//! and an append-only outbox drained by a FIFO publisher.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The durable event outbox.
pub mod outbox;
/// The outbox publisher.
pub mod publisher;
/// The retry queue.
pub mod queue;
/// The background sweeper.
pub mod sweeper;

pub use outbox::{MemoryOutbox, Outbox, OutboxEvent, OutboxEventType, OutboxStatus};
pub use publisher::{NotifyError, Notifier, PublishStats, Publisher};
pub use queue::{MemoryRetryQueue, NewRetryItem, RetryItem, RetryQueue, RetryStatus};
pub use sweeper::{SweepError, SweepStats, Sweeper, SweptExecutor};

use uuid::Uuid;

/// Errors from relay storage operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No item or event with the given id.
    #[error("relay entry {id} not found")]
    NotFound {
        /// The missing id.
        id: Uuid,
    },

    /// The entry is not in a state that allows the operation.
    #[error("relay entry {id} is in state {state}, operation not allowed")]
    InvalidState {
        /// The entry id.
        id: Uuid,
        /// Its current state.
        state: String,
    },

    /// Underlying storage failure.
    #[error("relay storage failure: {reason}")]
    Storage {
        /// What went wrong.
        reason: String,
    },
}
