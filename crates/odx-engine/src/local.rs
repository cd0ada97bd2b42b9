// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-process engine.
//!
//! A complete implementation of the [`EngineClient`] contract on tokio:
//! per-name FIFO signal queues, timers, query snapshots, cooperative
//! cancellation, and continue-as-new restarts that preserve the workflow
//! id across runs. Tests and local development run on this engine; the
//! workflow code cannot tell the difference.

use crate::{EngineClient, EngineError, RuntimeStatus, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow contract
// ---------------------------------------------------------------------------

/// Why a workflow run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowExit {
    /// Finished successfully with a result.
    Complete(Value),
    /// Finished after compensating for a cancellation.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
    /// Restart as a fresh run with new input, keeping the workflow id.
    ContinueAsNew(Value),
}

/// A workflow-level failure.
#[derive(Debug, thiserror::Error)]
#[error("workflow failed: {reason}")]
pub struct WorkflowFailure {
    /// Terminal failure reason.
    pub reason: String,
}

/// A workflow definition the local engine can host.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Run one workflow instance to completion.
    async fn run(&self, ctx: WorkflowContext, input: Value)
    -> Result<WorkflowExit, WorkflowFailure>;
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SignalHub {
    queues: Mutex<HashMap<String, VecDeque<Value>>>,
    notify: Notify,
}

impl SignalHub {
    async fn push(&self, name: &str, payload: Value) {
        self.queues
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .push_back(payload);
        // notify_one stores a permit when nobody waits yet, so a push that
        // lands between try_pop and the await is never lost. The workflow
        // is single-threaded per instance; there is at most one waiter.
        self.notify.notify_one();
    }

    async fn try_pop(&self, name: &str) -> Option<Value> {
        self.queues
            .lock()
            .await
            .get_mut(name)
            .and_then(VecDeque::pop_front)
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Why an await ended without a signal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitInterrupted {
    /// Cancellation arrived; compensate and exit.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

struct InstanceShared {
    workflow_id: String,
    signals: SignalHub,
    state: RwLock<Value>,
    current_step: RwLock<String>,
    cancel: watch::Receiver<Option<String>>,
}

/// The engine-provided capabilities a workflow runs against.
#[derive(Clone)]
pub struct WorkflowContext {
    shared: Arc<InstanceShared>,
}

impl WorkflowContext {
    /// The workflow id (equals the case id).
    pub fn workflow_id(&self) -> &str {
        &self.shared.workflow_id
    }

    /// Report the step the workflow is currently in.
    pub async fn set_step(&self, step: &str) {
        *self.shared.current_step.write().await = step.to_string();
    }

    /// Publish the queryable state snapshot.
    pub async fn set_state(&self, state: Value) {
        *self.shared.state.write().await = state;
    }

    /// The cancellation reason, if cancellation was requested.
    pub fn cancel_requested(&self) -> Option<String> {
        self.shared.cancel.borrow().clone()
    }

    /// Wait for the next signal with the given name (FIFO per name).
    ///
    /// Ends early with [`WaitInterrupted::Cancelled`] when cancellation
    /// arrives while waiting.
    pub async fn await_signal(&self, name: &str) -> Result<Value, WaitInterrupted> {
        let mut cancel = self.shared.cancel.clone();
        loop {
            if let Some(payload) = self.shared.signals.try_pop(name).await {
                return Ok(payload);
            }
            if let Some(reason) = cancel.borrow().clone() {
                return Err(WaitInterrupted::Cancelled { reason });
            }
            tokio::select! {
                _ = self.shared.signals.notify.notified() => {}
                _ = cancel.changed() => {}
            }
        }
    }

    /// Like [`await_signal`](Self::await_signal) with a timer racing the
    /// signal: `Ok(None)` on timeout.
    pub async fn await_signal_timeout(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, WaitInterrupted> {
        tokio::select! {
            result = self.await_signal(name) => result.map(Some),
            _ = tokio::time::sleep(timeout) => Ok(None),
        }
    }

    /// Durable-timer sleep that cancellation can interrupt.
    pub async fn sleep(&self, duration: Duration) -> Result<(), WaitInterrupted> {
        let mut cancel = self.shared.cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = cancel.changed() => {
                match cancel.borrow().clone() {
                    Some(reason) => Err(WaitInterrupted::Cancelled { reason }),
                    None => Ok(()),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LocalEngine
// ---------------------------------------------------------------------------

struct Instance {
    run_id: Uuid,
    shared: Arc<InstanceShared>,
    status: Arc<RwLock<RuntimeStatus>>,
    started_at: DateTime<Utc>,
    closed_at: Arc<RwLock<Option<DateTime<Utc>>>>,
    cancel_tx: watch::Sender<Option<String>>,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// In-process [`EngineClient`] hosting one workflow definition.
pub struct LocalEngine {
    definition: Arc<dyn Workflow>,
    instances: RwLock<HashMap<String, Arc<Instance>>>,
}

impl LocalEngine {
    /// Build an engine hosting the given workflow definition.
    pub fn new(definition: Arc<dyn Workflow>) -> Self {
        Self {
            definition,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Wait until the instance closes (tests and drain-on-shutdown).
    pub async fn join(&self, workflow_id: &str) -> Result<RuntimeStatus, EngineError> {
        let instance = self.instance(workflow_id).await?;
        let handle = instance.join.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(*instance.status.read().await)
    }

    async fn instance(&self, workflow_id: &str) -> Result<Arc<Instance>, EngineError> {
        self.instances
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    fn spawn_run(
        definition: Arc<dyn Workflow>,
        instance: Arc<Instance>,
        input: Value,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut input = input;
            loop {
                let ctx = WorkflowContext {
                    shared: instance.shared.clone(),
                };
                let workflow_id = instance.shared.workflow_id.clone();
                match definition.run(ctx, input).await {
                    Ok(WorkflowExit::Complete(_)) => {
                        *instance.status.write().await = RuntimeStatus::Completed;
                        info!(workflow_id = %workflow_id, "workflow completed");
                        break;
                    }
                    Ok(WorkflowExit::Cancelled { reason }) => {
                        *instance.status.write().await = RuntimeStatus::Cancelled;
                        info!(workflow_id = %workflow_id, reason = %reason, "workflow cancelled");
                        break;
                    }
                    Ok(WorkflowExit::ContinueAsNew(next_input)) => {
                        info!(workflow_id = %workflow_id, "workflow continuing as new run");
                        input = next_input;
                        continue;
                    }
                    Err(failure) => {
                        *instance.status.write().await = RuntimeStatus::Failed;
                        warn!(workflow_id = %workflow_id, reason = %failure.reason, "workflow failed");
                        break;
                    }
                }
            }
            *instance.closed_at.write().await = Some(Utc::now());
        })
    }
}

#[async_trait]
impl EngineClient for LocalEngine {
    async fn start(&self, workflow_id: &str, input: Value) -> Result<Uuid, EngineError> {
        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(workflow_id) {
            if *existing.status.read().await == RuntimeStatus::Running {
                return Err(EngineError::AlreadyRunning {
                    workflow_id: workflow_id.to_string(),
                });
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(None);
        let shared = Arc::new(InstanceShared {
            workflow_id: workflow_id.to_string(),
            signals: SignalHub::default(),
            state: RwLock::new(Value::Null),
            current_step: RwLock::new("stored".to_string()),
            cancel: cancel_rx,
        });
        let run_id = Uuid::new_v4();
        let instance = Arc::new(Instance {
            run_id,
            shared,
            status: Arc::new(RwLock::new(RuntimeStatus::Running)),
            started_at: Utc::now(),
            closed_at: Arc::new(RwLock::new(None)),
            cancel_tx,
            join: Mutex::new(None),
        });

        let handle = Self::spawn_run(self.definition.clone(), instance.clone(), input);
        *instance.join.lock().await = Some(handle);
        instances.insert(workflow_id.to_string(), instance);
        info!(workflow_id = %workflow_id, run_id = %run_id, "workflow started");
        Ok(run_id)
    }

    async fn signal(
        &self,
        workflow_id: &str,
        name: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        let instance = self.instance(workflow_id).await?;
        if instance.status.read().await.is_closed() {
            // Signals to closed workflows drop; at-most-once effect.
            warn!(workflow_id = %workflow_id, signal = %name, "signal to closed workflow dropped");
            return Ok(());
        }
        instance.shared.signals.push(name, payload).await;
        Ok(())
    }

    async fn query(&self, workflow_id: &str, name: &str) -> Result<Value, EngineError> {
        let instance = self.instance(workflow_id).await?;
        match name {
            "getState" => Ok(instance.shared.state.read().await.clone()),
            other => Err(EngineError::UnknownQuery {
                workflow_id: workflow_id.to_string(),
                name: other.to_string(),
            }),
        }
    }

    async fn cancel(&self, workflow_id: &str, reason: &str) -> Result<(), EngineError> {
        let instance = self.instance(workflow_id).await?;
        let _ = instance.cancel_tx.send(Some(reason.to_string()));
        Ok(())
    }

    async fn terminate(&self, workflow_id: &str, reason: &str) -> Result<(), EngineError> {
        let instance = self.instance(workflow_id).await?;
        if let Some(handle) = instance.join.lock().await.take() {
            handle.abort();
        }
        *instance.status.write().await = RuntimeStatus::Failed;
        *instance.closed_at.write().await = Some(Utc::now());
        warn!(workflow_id = %workflow_id, reason = %reason, "workflow terminated");
        Ok(())
    }

    async fn status(&self, workflow_id: &str) -> Result<WorkflowStatus, EngineError> {
        let instance = self.instance(workflow_id).await?;
        Ok(WorkflowStatus {
            workflow_id: workflow_id.to_string(),
            run_id: instance.run_id,
            status: *instance.status.read().await,
            current_step: Some(instance.shared.current_step.read().await.clone()),
            started_at: instance.started_at,
            closed_at: *instance.closed_at.read().await,
        })
    }
}
