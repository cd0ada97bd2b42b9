// SPDX-License-Identifier: MIT OR Apache-2.0
//! The order-processing saga.
//!
//! ```text
//! stored → parsed → committee-mapped → customer-resolved → items-resolved
//!        → awaiting-approval → draft-created → notified → completed
//! ```
//!
//! with `awaiting-reupload`, `awaiting-corrections`, and
//! `awaiting-selections` loops on the way, driven by typed signals.
//! Human suspension points carry reminder/escalation/max-wait timers;
//! cancellation is caught at every suspension and compensated.

use crate::activities::{Activities, ActivityError};
use crate::notify::NoticeKind;
use odx_books::DraftOutcome;
use odx_core::{
    CanonicalOrder, CaseStatus, ChatRef, Issue, IssueCode, PatchOp, ResolutionStatus,
    WorkflowSignal, SIGNAL_APPROVAL_RECEIVED, SIGNAL_CORRECTIONS_SUBMITTED,
    SIGNAL_FILE_REUPLOADED, SIGNAL_SELECTIONS_SUBMITTED,
};
use odx_engine::{
    WaitInterrupted, Workflow, WorkflowContext, WorkflowExit, WorkflowFailure,
};
use odx_match::ItemMatch;
use odx_retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::policy;

// ---------------------------------------------------------------------------
// Input and timers
// ---------------------------------------------------------------------------

/// What `POST /workflow/start` hands the saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    /// The case (and workflow) id.
    pub case_id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Uploading user.
    pub user_id: String,
    /// Where the workbook was parked by the bot collaborator.
    pub blob_url: String,
    /// Original filename.
    pub filename: String,
    /// Correlation id surfaced on every user-visible failure.
    pub correlation_id: String,
    /// Chat reference for notifications.
    #[serde(default)]
    pub chat: ChatRef,
    /// The user's locale, when the bot knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Reminder / escalation / absolute-maximum waits for human input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// First tick: remind the user.
    pub reminder: Duration,
    /// Second tick: escalate to the manager channel.
    pub escalation: Duration,
    /// Absolute maximum; after this the workflow fails.
    pub max_wait: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            reminder: Duration::from_secs(24 * 3600),
            escalation: Duration::from_secs(48 * 3600),
            max_wait: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

// ---------------------------------------------------------------------------
// Saga
// ---------------------------------------------------------------------------

/// What a human wait ended with.
enum Waited {
    Signal(WorkflowSignal),
    TimedOut,
    Cancelled(String),
}

/// The saga definition hosted by the engine.
pub struct OrderWorkflow {
    activities: Arc<Activities>,
    timers: TimerConfig,
}

impl OrderWorkflow {
    /// Build the saga over its activities and timer configuration.
    pub fn new(activities: Arc<Activities>, timers: TimerConfig) -> Self {
        Self { activities, timers }
    }

    /// Run one activity under its retry policy.
    async fn run_activity<T, Fut>(
        &self,
        policy: RetryPolicy,
        op: impl FnMut() -> Fut,
    ) -> Result<T, ActivityError>
    where
        Fut: Future<Output = Result<T, ActivityError>>,
    {
        policy.run(op, ActivityError::is_retryable).await
    }

    async fn step(&self, ctx: &WorkflowContext, input: &WorkflowInput, step: &str, extra: Value) {
        ctx.set_step(step).await;
        let mut state = json!({
            "case_id": input.case_id,
            "correlation_id": input.correlation_id,
            "current_step": step,
        });
        if let (Some(state_map), Some(extra_map)) = (state.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_map {
                state_map.insert(k.clone(), v.clone());
            }
        }
        ctx.set_state(state).await;
    }

    /// Suspend on a named signal with the three-phase timer ladder.
    async fn await_human(
        &self,
        ctx: &WorkflowContext,
        input: &WorkflowInput,
        signal_name: &str,
    ) -> Waited {
        let ladder = [
            (self.timers.reminder, Some(NoticeKind::Reminder)),
            (
                self.timers.escalation.saturating_sub(self.timers.reminder),
                Some(NoticeKind::Escalation),
            ),
            (
                self.timers.max_wait.saturating_sub(self.timers.escalation),
                None,
            ),
        ];

        for (window, on_timeout) in ladder {
            loop {
                match ctx.await_signal_timeout(signal_name, window).await {
                    Err(WaitInterrupted::Cancelled { reason }) => {
                        return Waited::Cancelled(reason);
                    }
                    Ok(Some(payload)) => {
                        match WorkflowSignal::parse(signal_name, payload) {
                            Ok(signal) => return Waited::Signal(signal),
                            Err(err) => {
                                // Contract violation: drop-log, keep waiting.
                                warn!(case_id = %input.case_id, signal = signal_name, error = %err, "malformed signal dropped");
                                continue;
                            }
                        }
                    }
                    Ok(None) => break,
                }
            }
            if let Some(kind) = on_timeout {
                let message = match kind {
                    NoticeKind::Reminder => "this order is still waiting for your input",
                    _ => "an order has been waiting for input past the escalation window",
                };
                if let Err(err) = self.activities.notify(input.case_id, kind, message).await {
                    warn!(case_id = %input.case_id, error = %err, "timer notification failed");
                }
            }
        }
        Waited::TimedOut
    }

    /// Append issues to the case, preserving what is already there.
    async fn append_issues(
        &self,
        input: &WorkflowInput,
        new_issues: Vec<Issue>,
    ) -> Result<CanonicalOrder, ActivityError> {
        let case = self
            .activities
            .cases
            .read(&input.tenant_id, input.case_id)
            .await?;
        let mut issues = case.issues;
        for issue in new_issues {
            if !issues.iter().any(|i| i == &issue) {
                issues.push(issue);
            }
        }
        let updated = self
            .activities
            .cases
            .set_issues(&input.tenant_id, input.case_id, issues, "workflow")
            .await?;
        updated
            .order
            .ok_or_else(|| ActivityError::Fatal("case has no order".into()))
    }

    async fn suspend(&self, input: &WorkflowInput) {
        if let Err(err) = self
            .activities
            .cases
            .transition(
                &input.tenant_id,
                input.case_id,
                CaseStatus::AwaitingInput,
                "workflow",
            )
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "suspend transition failed");
        }
    }

    async fn resume(&self, input: &WorkflowInput) {
        if let Err(err) = self
            .activities
            .cases
            .transition(
                &input.tenant_id,
                input.case_id,
                CaseStatus::Processing,
                "workflow",
            )
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "resume transition failed");
        }
    }

    /// Terminal failure: mark the case, tell the user, fail the workflow.
    async fn fail(
        &self,
        input: &WorkflowInput,
        reason: String,
        extra_issue: Option<Issue>,
    ) -> WorkflowFailure {
        if let Some(issue) = extra_issue {
            let _ = self.append_issues(input, vec![issue]).await;
        }
        if let Err(err) = self
            .activities
            .cases
            .transition(
                &input.tenant_id,
                input.case_id,
                CaseStatus::Failed,
                "workflow",
            )
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "failure transition failed");
        }
        let message = format!("order processing failed ({reason}); reference {}", input.correlation_id);
        if let Err(err) = self
            .activities
            .notify(input.case_id, NoticeKind::Failed, &message)
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "failure notification failed");
        }
        WorkflowFailure { reason }
    }

    async fn timeout_failure(&self, input: &WorkflowInput) -> WorkflowFailure {
        self.fail(
            input,
            "HUMAN_RESPONSE_TIMEOUT".to_string(),
            Some(Issue::new(IssueCode::HumanResponseTimeout)),
        )
        .await
    }

    /// Compensation on cancellation: mark the case, clear any uncommitted
    /// fingerprint, send a best-effort notification.
    async fn compensate(
        &self,
        input: &WorkflowInput,
        reason: String,
        draft_context: Option<(&CanonicalOrder, &str, &BTreeMap<usize, String>)>,
    ) -> WorkflowExit {
        if let Err(err) = self
            .activities
            .cases
            .transition(
                &input.tenant_id,
                input.case_id,
                CaseStatus::Cancelled,
                "workflow",
            )
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "cancel transition failed");
        }
        if let Some((order, customer_id, resolutions)) = draft_context {
            self.activities
                .clear_fingerprint(order, customer_id, resolutions)
                .await;
        }
        let message = format!("the order was cancelled ({reason})");
        if let Err(err) = self
            .activities
            .notify(input.case_id, NoticeKind::Cancelled, &message)
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "cancellation notification failed");
        }
        info!(case_id = %input.case_id, reason = %reason, "workflow compensated and cancelled");
        WorkflowExit::Cancelled { reason }
    }
}

#[async_trait::async_trait]
impl Workflow for OrderWorkflow {
    async fn run(
        &self,
        ctx: WorkflowContext,
        input: Value,
    ) -> Result<WorkflowExit, WorkflowFailure> {
        let input: WorkflowInput = serde_json::from_value(input).map_err(|e| WorkflowFailure {
            reason: format!("unreadable workflow input: {e}"),
        })?;
        let a = &self.activities;

        // -- stored ---------------------------------------------------------
        self.step(&ctx, &input, "stored", json!({})).await;
        let upload = match self
            .run_activity(policy::store_file(), || a.store_file(&input))
            .await
        {
            Ok(upload) => upload,
            Err(err) => return Err(self.fail(&input, format!("store failed: {err}"), None).await),
        };

        // -- parsed ---------------------------------------------------------
        self.step(&ctx, &input, "parsed", json!({})).await;
        let mut order = match self
            .run_activity(policy::parse(), || a.parse_file(&input, &upload))
            .await
        {
            Ok(order) => order,
            Err(err) => return Err(self.fail(&input, format!("parse failed: {err}"), None).await),
        };

        // Parser blockers suspend on a re-upload instead of dying.
        if order.has_blocker() {
            self.suspend(&input).await;
            let action = order
                .issues
                .first()
                .map(|i| i.suggested_user_action.clone())
                .unwrap_or_default();
            let message =
                format!("the uploaded file cannot be processed: {action} (reference {})", input.correlation_id);
            if let Err(err) = a.notify(input.case_id, NoticeKind::InputNeeded, &message).await {
                warn!(case_id = %input.case_id, error = %err, "blocker notification failed");
            }
            self.step(&ctx, &input, "awaiting-reupload", json!({})).await;
            return match self.await_human(&ctx, &input, SIGNAL_FILE_REUPLOADED).await {
                Waited::Signal(WorkflowSignal::FileReuploaded { blob_url }) => {
                    let mut next = input.clone();
                    next.blob_url = blob_url;
                    let next = serde_json::to_value(&next).map_err(|e| WorkflowFailure {
                        reason: format!("restart input failed to encode: {e}"),
                    })?;
                    Ok(WorkflowExit::ContinueAsNew(next))
                }
                Waited::Signal(other) => {
                    warn!(case_id = %input.case_id, signal = other.name(), "unexpected signal at awaiting-reupload");
                    Err(self.timeout_failure(&input).await)
                }
                Waited::TimedOut => Err(self.timeout_failure(&input).await),
                Waited::Cancelled(reason) => Ok(self.compensate(&input, reason, None).await),
            };
        }

        // Item selections can arrive bundled with a customer selection, so
        // the resolution map lives across both phases.
        let mut resolutions: BTreeMap<usize, String> = BTreeMap::new();

        // -- committee-mapped ------------------------------------------------
        loop {
            self.step(&ctx, &input, "committee-mapped", json!({})).await;
            let verdict = match self
                .run_activity(policy::committee(), || a.run_committee(&order))
                .await
            {
                Ok(verdict) => verdict,
                Err(err) => {
                    return Err(self.fail(&input, format!("committee failed: {err}"), None).await);
                }
            };
            if !verdict.outcome.needs_human() {
                break;
            }

            let disagreement = Issue::new(IssueCode::CommitteeDisagreement).with_fields(
                verdict
                    .disagreements
                    .iter()
                    .map(|d| format!("schema_inference/mappings/{}", d.source_column))
                    .collect(),
            );
            order = match self.append_issues(&input, vec![disagreement]).await {
                Ok(order) => order,
                Err(err) => return Err(self.fail(&input, err.to_string(), None).await),
            };
            self.suspend(&input).await;
            let message = format!(
                "the column mapping needs review (reference {})",
                input.correlation_id
            );
            if let Err(err) = a.notify(input.case_id, NoticeKind::InputNeeded, &message).await {
                warn!(case_id = %input.case_id, error = %err, "corrections notification failed");
            }
            self.step(&ctx, &input, "awaiting-corrections", json!({})).await;

            match self
                .await_human(&ctx, &input, SIGNAL_CORRECTIONS_SUBMITTED)
                .await
            {
                Waited::Signal(WorkflowSignal::CorrectionsSubmitted { ops }) => {
                    match self.apply_corrections(&input, &ops).await {
                        Some(updated) => order = updated,
                        None => continue,
                    }
                    self.resume(&input).await;
                }
                Waited::Signal(other) => {
                    warn!(case_id = %input.case_id, signal = other.name(), "unexpected signal at awaiting-corrections");
                }
                Waited::TimedOut => return Err(self.timeout_failure(&input).await),
                Waited::Cancelled(reason) => {
                    return Ok(self.compensate(&input, reason, None).await);
                }
            }
        }

        // -- customer-resolved ----------------------------------------------
        let customer_id = loop {
            self.step(&ctx, &input, "customer-resolved", json!({})).await;
            if let Some(id) = order.customer.resolved_id.clone() {
                break id;
            }

            let matched = match self
                .run_activity(policy::resolve(), || a.resolve_customer(&order))
                .await
            {
                Ok(matched) => matched,
                Err(err) => {
                    return Err(
                        self.fail(&input, format!("customer resolution failed: {err}"), None).await
                    );
                }
            };

            if matched.resolution == ResolutionStatus::Resolved {
                if let Some(id) = matched.selected_id.clone() {
                    order = match self.record_customer(&input, &id).await {
                        Some(order) => order,
                        None => {
                            return Err(
                                self.fail(&input, "customer patch failed".into(), None).await
                            );
                        }
                    };
                    break id;
                }
            }

            let code = match matched.resolution {
                ResolutionStatus::Ambiguous => IssueCode::AmbiguousCustomer,
                _ => IssueCode::CustomerNotFound,
            };
            let candidates: Vec<String> = matched
                .candidates
                .iter()
                .map(|c| format!("{} ({})", c.name, c.id))
                .collect();
            let issue = Issue::new(code)
                .with_message(format!(
                    "{}; candidates: {}",
                    code.default_message(),
                    candidates.join(", ")
                ))
                .with_fields(vec!["customer".into()]);
            order = match self.append_issues(&input, vec![issue]).await {
                Ok(order) => order,
                Err(err) => return Err(self.fail(&input, err.to_string(), None).await),
            };

            self.suspend(&input).await;
            let message = format!(
                "please pick the intended customer (reference {})",
                input.correlation_id
            );
            if let Err(err) = a.notify(input.case_id, NoticeKind::InputNeeded, &message).await {
                warn!(case_id = %input.case_id, error = %err, "selection notification failed");
            }
            self.step(&ctx, &input, "awaiting-selections", json!({"for": "customer"}))
                .await;

            match self
                .await_human(&ctx, &input, SIGNAL_SELECTIONS_SUBMITTED)
                .await
            {
                Waited::Signal(WorkflowSignal::SelectionsSubmitted { customer, items }) => {
                    for (row, item) in items {
                        resolutions.insert(row, item.id);
                    }
                    if let Some(selected) = customer {
                        if let Some(updated) = self.record_customer(&input, &selected.id).await {
                            order = updated;
                        }
                    }
                    self.resume(&input).await;
                }
                Waited::Signal(other) => {
                    warn!(case_id = %input.case_id, signal = other.name(), "unexpected signal at awaiting-selections");
                }
                Waited::TimedOut => return Err(self.timeout_failure(&input).await),
                Waited::Cancelled(reason) => {
                    return Ok(self.compensate(&input, reason, None).await);
                }
            }
        };

        // -- items-resolved --------------------------------------------------
        loop {
            self.step(
                &ctx,
                &input,
                "items-resolved",
                json!({"resolved": resolutions.len()}),
            )
            .await;

            let matches = match self
                .run_activity(policy::resolve(), || a.resolve_items(&order))
                .await
            {
                Ok(matches) => matches,
                Err(err) => {
                    return Err(
                        self.fail(&input, format!("item resolution failed: {err}"), None).await
                    );
                }
            };

            let mut pending = Vec::new();
            for (row, matched) in matches {
                if resolutions.contains_key(&row) {
                    continue;
                }
                match matched {
                    ItemMatch::Resolved { id, .. } => {
                        resolutions.insert(row, id);
                    }
                    ItemMatch::Ambiguous { candidates } => {
                        pending.push((row, IssueCode::AmbiguousItem, candidates.len()));
                    }
                    ItemMatch::NotFound => pending.push((row, IssueCode::ItemNotFound, 0)),
                }
            }

            if pending.is_empty() {
                break;
            }

            let issues = pending
                .iter()
                .map(|(row, code, _)| {
                    Issue::new(*code).with_fields(vec![format!("line_items/{row}")])
                })
                .collect();
            order = match self.append_issues(&input, issues).await {
                Ok(order) => order,
                Err(err) => return Err(self.fail(&input, err.to_string(), None).await),
            };

            self.suspend(&input).await;
            let message = format!(
                "{} line(s) need an item selection (reference {})",
                pending.len(),
                input.correlation_id
            );
            if let Err(err) = a.notify(input.case_id, NoticeKind::InputNeeded, &message).await {
                warn!(case_id = %input.case_id, error = %err, "item selection notification failed");
            }
            self.step(&ctx, &input, "awaiting-selections", json!({"for": "items"}))
                .await;

            match self
                .await_human(&ctx, &input, SIGNAL_SELECTIONS_SUBMITTED)
                .await
            {
                Waited::Signal(WorkflowSignal::SelectionsSubmitted { customer: _, items }) => {
                    for (row, item) in items {
                        resolutions.insert(row, item.id);
                    }
                    self.resume(&input).await;
                }
                Waited::Signal(other) => {
                    warn!(case_id = %input.case_id, signal = other.name(), "unexpected signal at awaiting-selections");
                }
                Waited::TimedOut => return Err(self.timeout_failure(&input).await),
                Waited::Cancelled(reason) => {
                    return Ok(self
                        .compensate(&input, reason, Some((&order, customer_id.as_str(), &resolutions)))
                        .await);
                }
            }
        }

        // -- awaiting-approval ----------------------------------------------
        self.suspend(&input).await;
        let message = format!(
            "the order is ready for approval (reference {})",
            input.correlation_id
        );
        if let Err(err) = a.notify(input.case_id, NoticeKind::InputNeeded, &message).await {
            warn!(case_id = %input.case_id, error = %err, "approval notification failed");
        }
        self.step(&ctx, &input, "awaiting-approval", json!({})).await;

        let approver = loop {
            match self.await_human(&ctx, &input, SIGNAL_APPROVAL_RECEIVED).await {
                Waited::Signal(WorkflowSignal::ApprovalReceived {
                    approved,
                    approver,
                    comments,
                }) => {
                    if approved {
                        break approver;
                    }
                    let reason = format!(
                        "rejected by {approver}{}",
                        comments.map(|c| format!(": {c}")).unwrap_or_default()
                    );
                    return Ok(self
                        .compensate(&input, reason, Some((&order, customer_id.as_str(), &resolutions)))
                        .await);
                }
                Waited::Signal(other) => {
                    warn!(case_id = %input.case_id, signal = other.name(), "unexpected signal at awaiting-approval");
                }
                Waited::TimedOut => return Err(self.timeout_failure(&input).await),
                Waited::Cancelled(reason) => {
                    return Ok(self
                        .compensate(&input, reason, Some((&order, customer_id.as_str(), &resolutions)))
                        .await);
                }
            }
        };

        self.resume(&input).await;
        if let Err(err) = a
            .cases
            .transition(&input.tenant_id, input.case_id, CaseStatus::Ready, "workflow")
            .await
        {
            warn!(case_id = %input.case_id, error = %err, "ready transition failed");
        }

        // -- draft-created ---------------------------------------------------
        self.step(&ctx, &input, "draft-created", json!({"approver": approver}))
            .await;
        let outcome = match self
            .run_activity(policy::create_draft(), || {
                a.create_draft(&order, &customer_id, &resolutions)
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(self.fail(&input, format!("draft creation failed: {err}"), None).await);
            }
        };

        let (completion, draft_id) = match &outcome {
            DraftOutcome::Created { id, number } | DraftOutcome::Duplicate { id, number } => {
                if let Err(err) = a
                    .cases
                    .set_draft(&input.tenant_id, input.case_id, id, "workflow")
                    .await
                {
                    warn!(case_id = %input.case_id, error = %err, "draft id not recorded");
                }
                if let Err(err) = a
                    .cases
                    .transition(
                        &input.tenant_id,
                        input.case_id,
                        CaseStatus::DraftCreated,
                        "workflow",
                    )
                    .await
                {
                    warn!(case_id = %input.case_id, error = %err, "draft-created transition failed");
                }
                (
                    format!("draft {number} was created in the accounting system"),
                    Some(id.clone()),
                )
            }
            DraftOutcome::Queued { .. } | DraftOutcome::InFlightElsewhere { .. } => (
                "the draft is queued and will be created as soon as the accounting system responds"
                    .to_string(),
                None,
            ),
        };

        // -- notified --------------------------------------------------------
        self.step(&ctx, &input, "notified", json!({})).await;
        let kind = if draft_id.is_some() {
            NoticeKind::DraftCreated
        } else {
            NoticeKind::DraftQueued
        };
        if let Err(err) = self
            .run_activity(policy::notify(), || a.notify(input.case_id, kind, &completion))
            .await
        {
            // The draft exists; losing the notification is not worth
            // failing the whole case over.
            warn!(case_id = %input.case_id, error = %err, "completion notification exhausted retries");
        }

        // -- completed -------------------------------------------------------
        self.step(&ctx, &input, "completed", json!({"draft_id": draft_id}))
            .await;
        Ok(WorkflowExit::Complete(json!({
            "case_id": input.case_id,
            "draft_id": draft_id,
        })))
    }
}

impl OrderWorkflow {
    /// Apply correction ops; contract violations drop with a log.
    async fn apply_corrections(
        &self,
        input: &WorkflowInput,
        ops: &[PatchOp],
    ) -> Option<CanonicalOrder> {
        match self
            .activities
            .cases
            .apply_patch(&input.tenant_id, input.case_id, ops, &input.user_id)
            .await
        {
            Ok(case) => case.order,
            Err(err) => {
                warn!(case_id = %input.case_id, error = %err, "corrections dropped");
                None
            }
        }
    }

    /// Record the resolved customer on the order.
    async fn record_customer(
        &self,
        input: &WorkflowInput,
        customer_id: &str,
    ) -> Option<CanonicalOrder> {
        let ops = vec![
            PatchOp::Replace {
                path: "customer/resolution".into(),
                value: json!("resolved"),
            },
            PatchOp::Add {
                path: "customer/resolved_id".into(),
                value: json!(customer_id),
            },
        ];
        match self
            .activities
            .cases
            .apply_patch(&input.tenant_id, input.case_id, &ops, "workflow")
            .await
        {
            Ok(case) => case.order,
            Err(err) => {
                warn!(case_id = %input.case_id, error = %err, "customer resolution patch failed");
                None
            }
        }
    }
}
