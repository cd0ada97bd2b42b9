// SPDX-License-Identifier: MIT OR Apache-2.0
//! The case mutation service.
//!
//! Workflow activities and signal handlers never touch the store directly:
//! every mutation goes through [`CaseService`], which enforces status
//! transitions, applies structured patches, re-validates after edits, and
//! writes the audit trail.

use crate::audit::{AuditRecord, AuditSink};
use crate::{CaseFilter, CaseStore, StoreError};
use odx_core::{CanonicalOrder, Case, CaseStatus, Issue, IssueCode, PatchOp, apply_patch};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Issue codes owned by the order validator; re-validation replaces these
/// and leaves everything else (parser-stage, matcher, committee) alone.
const VALIDATOR_CODES: &[IssueCode] = &[
    IssueCode::MissingCustomer,
    IssueCode::MissingQuantity,
    IssueCode::MissingItemIdentifier,
    IssueCode::NegativeQuantity,
    IssueCode::ArithmeticMismatch,
    IssueCode::SubtotalMismatch,
];

/// High-level case mutations with audit.
#[derive(Clone)]
pub struct CaseService {
    store: Arc<dyn CaseStore>,
    audit: Arc<dyn AuditSink>,
}

impl CaseService {
    /// Build a service over a store and an audit sink.
    pub fn new(store: Arc<dyn CaseStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Access the underlying store (read paths).
    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    /// Create a case and audit its birth.
    pub async fn create(&self, case: Case, actor: &str) -> Result<(), StoreError> {
        self.store.create(case.clone()).await?;
        self.audit
            .append(AuditRecord::new(
                case.case_id,
                actor,
                "case_created",
                json!({"tenant_id": case.tenant_id, "filename": case.source.filename}),
            ))
            .await;
        Ok(())
    }

    /// Read a case.
    pub async fn read(&self, tenant_id: &str, case_id: Uuid) -> Result<Case, StoreError> {
        self.store.read(tenant_id, case_id).await
    }

    /// List a user's cases.
    pub async fn list_by_user(
        &self,
        tenant_id: &str,
        uploader: &str,
        filter: &CaseFilter,
    ) -> Result<Vec<Case>, StoreError> {
        self.store.list_by_user(tenant_id, uploader, filter).await
    }

    /// Move a case to a new status, enforcing the lifecycle.
    pub async fn transition(
        &self,
        tenant_id: &str,
        case_id: Uuid,
        to: CaseStatus,
        actor: &str,
    ) -> Result<Case, StoreError> {
        let case = self.store.read(tenant_id, case_id).await?;
        if case.status == to {
            return Ok(case);
        }
        if !case.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                case_id,
                from: case.status,
                to,
            });
        }
        let from = case.status;
        let mut updated = case;
        updated.status = to;
        let updated = self.store.update(updated).await?;
        info!(case_id = %case_id, ?from, ?to, "case status changed");
        self.audit
            .append(AuditRecord::new(
                case_id,
                actor,
                "status_change",
                json!({"from": from, "to": to}),
            ))
            .await;
        Ok(updated)
    }

    /// Attach (or replace) the canonical order and mirror its issues.
    pub async fn set_order(
        &self,
        tenant_id: &str,
        case_id: Uuid,
        order: CanonicalOrder,
        actor: &str,
    ) -> Result<Case, StoreError> {
        let mut case = self.store.read(tenant_id, case_id).await?;
        case.issues = order.issues.clone();
        case.order = Some(order);
        let updated = self.store.update(case).await?;
        self.audit
            .append(AuditRecord::new(
                case_id,
                actor,
                "order_set",
                json!({"issues": updated.issues.len()}),
            ))
            .await;
        Ok(updated)
    }

    /// Record the created draft on the case.
    pub async fn set_draft(
        &self,
        tenant_id: &str,
        case_id: Uuid,
        draft_id: &str,
        actor: &str,
    ) -> Result<Case, StoreError> {
        let mut case = self.store.read(tenant_id, case_id).await?;
        case.draft_id = Some(draft_id.to_string());
        let updated = self.store.update(case).await?;
        self.audit
            .append(AuditRecord::new(
                case_id,
                actor,
                "draft_recorded",
                json!({"draft_id": draft_id}),
            ))
            .await;
        Ok(updated)
    }

    /// Replace case-level issues (matcher/committee findings).
    pub async fn set_issues(
        &self,
        tenant_id: &str,
        case_id: Uuid,
        issues: Vec<Issue>,
        actor: &str,
    ) -> Result<Case, StoreError> {
        let mut case = self.store.read(tenant_id, case_id).await?;
        case.issues = issues.clone();
        if let Some(order) = &mut case.order {
            order.issues = issues;
        }
        let updated = self.store.update(case).await?;
        self.audit
            .append(AuditRecord::new(
                case_id,
                actor,
                "issues_set",
                json!({"issues": updated.issues.len()}),
            ))
            .await;
        Ok(updated)
    }

    /// Apply structured patch operations to the case's order, then re-run
    /// the validator over the result.
    pub async fn apply_patch(
        &self,
        tenant_id: &str,
        case_id: Uuid,
        ops: &[PatchOp],
        actor: &str,
    ) -> Result<Case, StoreError> {
        let mut case = self.store.read(tenant_id, case_id).await?;
        let order = case.order.take().ok_or(StoreError::NotFound { case_id })?;

        let mut patched = apply_patch(&order, ops)?;
        revalidate(&mut patched);

        case.issues = patched.issues.clone();
        case.order = Some(patched);
        let updated = self.store.update(case).await?;
        self.audit
            .append(AuditRecord::new(
                case_id,
                actor,
                "patch",
                json!({"ops": ops.len()}),
            ))
            .await;
        Ok(updated)
    }

    /// Re-run the validator over the stored order in place.
    pub async fn revalidate(
        &self,
        tenant_id: &str,
        case_id: Uuid,
        actor: &str,
    ) -> Result<Case, StoreError> {
        let mut case = self.store.read(tenant_id, case_id).await?;
        let Some(order) = &mut case.order else {
            return Ok(case);
        };
        revalidate(order);
        case.issues = order.issues.clone();
        let updated = self.store.update(case).await?;
        self.audit
            .append(AuditRecord::new(
                case_id,
                actor,
                "revalidate",
                json!({"issues": updated.issues.len()}),
            ))
            .await;
        Ok(updated)
    }
}

/// Swap the validator-owned issues on an order for freshly computed ones.
fn revalidate(order: &mut CanonicalOrder) {
    order.issues.retain(|i| !VALIDATOR_CODES.contains(&i.code));
    order.issues.extend(odx_parser::validate_order(order));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAuditSink, MemoryCaseStore};
    use chrono::{DateTime, Utc};
    use odx_core::{ChatRef, Evidence, LineItem, OrderMeta, SourceMeta, Sourced};

    fn service() -> (CaseService, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (
            CaseService::new(Arc::new(MemoryCaseStore::new()), audit.clone()),
            audit,
        )
    }

    fn case(id: u128) -> Case {
        Case::new(
            Uuid::from_u128(id),
            "t1",
            SourceMeta {
                filename: "order.xlsx".into(),
                sha256: "00".repeat(32),
                uploader: "u@example.com".into(),
                chat: ChatRef::default(),
            },
        )
    }

    fn order(case_id: Uuid) -> CanonicalOrder {
        let meta = OrderMeta {
            case_id,
            tenant_id: "t1".into(),
            received_at: DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            filename: "order.xlsx".into(),
            sha256: "00".repeat(32),
            language_hint: None,
            parser_version: "test".into(),
            contains_formulas: false,
            sheets_processed: vec!["S".into()],
        };
        let mut order = CanonicalOrder::empty(meta);
        order.customer.input_name = Some(Sourced::new(
            "Acme".to_string(),
            Evidence::new("S", "B1", "Acme"),
        ));
        let mut line = LineItem::new(0, 3);
        line.sku = Some(Sourced::new("W-1".to_string(), Evidence::new("S", "A3", "W-1")));
        line.quantity = Some(Sourced::new(2.0, Evidence::new("S", "C3", "2")));
        order.line_items.push(line);
        order
    }

    #[tokio::test]
    async fn transition_rejects_invalid_moves() {
        let (svc, _) = service();
        let c = case(1);
        svc.create(c.clone(), "test").await.unwrap();
        let err = svc
            .transition("t1", c.case_id, CaseStatus::DraftCreated, "test")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn transition_audits() {
        let (svc, audit) = service();
        let c = case(1);
        svc.create(c.clone(), "test").await.unwrap();
        svc.transition("t1", c.case_id, CaseStatus::AwaitingInput, "workflow")
            .await
            .unwrap();
        let records = audit.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].action, "status_change");
        assert_eq!(records[1].actor, "workflow");
    }

    #[tokio::test]
    async fn same_status_transition_is_a_noop() {
        let (svc, audit) = service();
        let c = case(1);
        svc.create(c.clone(), "test").await.unwrap();
        let back = svc
            .transition("t1", c.case_id, CaseStatus::Processing, "test")
            .await
            .unwrap();
        assert_eq!(back.version, 1);
        assert_eq!(audit.records().await.len(), 1);
    }

    #[tokio::test]
    async fn patch_revalidates_the_order() {
        let (svc, _) = service();
        let c = case(1);
        let case_id = c.case_id;
        svc.create(c, "test").await.unwrap();
        svc.set_order("t1", case_id, order(case_id), "parser")
            .await
            .unwrap();

        // Turn the quantity negative; re-validation must flag it.
        let patched = svc
            .apply_patch(
                "t1",
                case_id,
                &[PatchOp::Replace {
                    path: "line_items/0/quantity/value".into(),
                    value: serde_json::json!(-2.0),
                }],
                "user",
            )
            .await
            .unwrap();
        assert!(
            patched
                .issues
                .iter()
                .any(|i| i.code == IssueCode::NegativeQuantity)
        );

        // And back to positive; the finding disappears.
        let healed = svc
            .apply_patch(
                "t1",
                case_id,
                &[PatchOp::Replace {
                    path: "line_items/0/quantity/value".into(),
                    value: serde_json::json!(2.0),
                }],
                "user",
            )
            .await
            .unwrap();
        assert!(healed.issues.is_empty());
    }

    #[tokio::test]
    async fn patch_outside_whitelist_fails() {
        let (svc, _) = service();
        let c = case(1);
        let case_id = c.case_id;
        svc.create(c, "test").await.unwrap();
        svc.set_order("t1", case_id, order(case_id), "parser")
            .await
            .unwrap();
        let err = svc
            .apply_patch(
                "t1",
                case_id,
                &[PatchOp::Replace {
                    path: "meta/sha256".into(),
                    value: serde_json::json!("ff"),
                }],
                "user",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Patch(_)));
    }
}
