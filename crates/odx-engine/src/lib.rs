// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-engine
//!
//! The seam between Orderdesk and whichever durable-workflow runtime backs
//! a deployment. [`EngineClient`] is all the rest of the system sees:
//! start, signal, query, cancel, status. [`LocalEngine`] is a complete
//! in-process implementation (signals, timers, queries, cancellation,
//! continue-as-new); [`HttpEngineClient`] is the thin adapter for an
//! external runtime. The workflow contract is identical either way.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The in-process engine.
pub mod local;
/// The remote HTTP adapter.
pub mod remote;

pub use local::{
    LocalEngine, WaitInterrupted, Workflow, WorkflowContext, WorkflowExit, WorkflowFailure,
};
pub use remote::HttpEngineClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Runtime status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStatus {
    /// Executing or suspended on a signal/timer.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
    /// Cancelled by request.
    Cancelled,
}

impl RuntimeStatus {
    /// `true` once the instance will make no further progress.
    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Snapshot of a workflow instance, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    /// Workflow id (equals the case id).
    pub workflow_id: String,
    /// Current run id.
    pub run_id: Uuid,
    /// Runtime status.
    pub status: RuntimeStatus,
    /// The step the workflow reported last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// When the first run started.
    pub started_at: DateTime<Utc>,
    /// When the instance closed, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No instance with this workflow id.
    #[error("workflow {workflow_id} not found")]
    NotFound {
        /// The missing workflow id.
        workflow_id: String,
    },

    /// A live instance already exists under this workflow id.
    #[error("workflow {workflow_id} is already running")]
    AlreadyRunning {
        /// The conflicting workflow id.
        workflow_id: String,
    },

    /// The queried name is not exposed by the workflow.
    #[error("workflow {workflow_id} has no query '{name}'")]
    UnknownQuery {
        /// The workflow id.
        workflow_id: String,
        /// The unknown query name.
        name: String,
    },

    /// The remote runtime rejected or failed the call.
    #[error("engine call failed: {reason}")]
    Remote {
        /// What went wrong.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// EngineClient
// ---------------------------------------------------------------------------

/// The durable-workflow operations Orderdesk consumes.
///
/// `workflow_id` equals the case id throughout, giving a 1:1 mapping
/// without any object graph between cases and workflows.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Start a new instance, returning its run id.
    async fn start(&self, workflow_id: &str, input: Value) -> Result<Uuid, EngineError>;

    /// Deliver a named signal. Delivery is FIFO per name.
    async fn signal(&self, workflow_id: &str, name: &str, payload: Value)
    -> Result<(), EngineError>;

    /// Synchronous, read-only state snapshot.
    async fn query(&self, workflow_id: &str, name: &str) -> Result<Value, EngineError>;

    /// Request cooperative cancellation; the workflow compensates at its
    /// next suspension point.
    async fn cancel(&self, workflow_id: &str, reason: &str) -> Result<(), EngineError>;

    /// Hard-stop the instance without compensation.
    async fn terminate(&self, workflow_id: &str, reason: &str) -> Result<(), EngineError>;

    /// Instance status.
    async fn status(&self, workflow_id: &str) -> Result<WorkflowStatus, EngineError>;
}
