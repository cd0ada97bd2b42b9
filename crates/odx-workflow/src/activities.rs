// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retryable activities.
//!
//! Everything the workflow does to the outside world lives here, one
//! idempotent operation per method. Activities never decide control flow;
//! they report typed results and the saga decides.

use crate::blob::{BlobError, BlobStore};
use crate::committee::{Committee, CommitteeError, CommitteeRequest};
use crate::notify::{CaseNotifier, NoticeKind};
use crate::saga::WorkflowInput;
use async_trait::async_trait;
use odx_books::{CatalogCache, DraftLine, DraftOrder, DraftOutcome, DraftWriter};
use odx_core::{CanonicalOrder, Case, CaseStatus, CommitteeVerdict, SourceMeta};
use odx_match::{CustomerMatch, ItemMatch, ItemMatchOptions, match_customer, match_item};
use odx_parser::workbook::Workbook;
use odx_parser::{LoadLimits, ParseOptions, SourceInfo, parse, parse_xlsx};
use odx_store::{CaseService, StoreError};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// How an activity attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    /// Worth retrying under the activity's policy.
    #[error("{0}")]
    Retryable(String),
    /// Retrying will not help; the workflow decides what dies.
    #[error("{0}")]
    Fatal(String),
}

impl ActivityError {
    /// `true` for the retryable kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

impl From<StoreError> for ActivityError {
    fn from(err: StoreError) -> Self {
        match err {
            // Lost optimistic races heal on retry; the rest will not.
            StoreError::VersionConflict { .. } | StoreError::Storage { .. } => {
                Self::Retryable(err.to_string())
            }
            other => Self::Fatal(other.to_string()),
        }
    }
}

impl From<BlobError> for ActivityError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound { .. } => Self::Fatal(err.to_string()),
            BlobError::Transfer { .. } => Self::Retryable(err.to_string()),
        }
    }
}

impl From<CommitteeError> for ActivityError {
    fn from(err: CommitteeError) -> Self {
        Self::Retryable(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Parser gateway
// ---------------------------------------------------------------------------

/// How uploaded bytes become a canonical order.
///
/// The production gateway reads `.xlsx`; the model gateway reads the
/// serialized workbook model, which is what tests and the local harness
/// feed through the same saga path.
#[async_trait]
pub trait ParserGateway: Send + Sync {
    /// Parse uploaded bytes.
    async fn parse(&self, bytes: &[u8], source: &SourceInfo) -> CanonicalOrder;
}

/// `.xlsx` parsing with the configured options and load limits.
pub struct XlsxParserGateway {
    /// Parse options.
    pub options: ParseOptions,
    /// Load bounds.
    pub limits: LoadLimits,
}

#[async_trait]
impl ParserGateway for XlsxParserGateway {
    async fn parse(&self, bytes: &[u8], source: &SourceInfo) -> CanonicalOrder {
        parse_xlsx(bytes, source, &self.options, &self.limits)
    }
}

/// Parses the JSON-serialized workbook model instead of `.xlsx` bytes.
pub struct ModelParserGateway {
    /// Parse options.
    pub options: ParseOptions,
}

#[async_trait]
impl ParserGateway for ModelParserGateway {
    async fn parse(&self, bytes: &[u8], source: &SourceInfo) -> CanonicalOrder {
        match serde_json::from_slice::<Workbook>(bytes) {
            Ok(workbook) => parse(&workbook, source, &self.options),
            Err(err) => {
                // An unreadable payload parses to the same blocker shape an
                // unreadable .xlsx would.
                warn!(error = %err, "workbook model payload unreadable");
                parse(&Workbook::default(), source, &self.options)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// The file as stored by the store-file activity.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// The uploaded bytes.
    pub bytes: Vec<u8>,
    /// SHA-256 of the bytes, lowercase hex.
    pub sha256: String,
}

/// Everything the saga's activities need, explicitly injected.
pub struct Activities {
    /// Case mutations.
    pub cases: CaseService,
    /// Upload storage.
    pub blobs: Arc<dyn BlobStore>,
    /// The parser gateway.
    pub parser: Arc<dyn ParserGateway>,
    /// The committee collaborator.
    pub committee: Arc<dyn Committee>,
    /// Accounting catalogs.
    pub catalogs: Arc<CatalogCache>,
    /// Draft creation.
    pub drafts: Arc<DraftWriter>,
    /// Chat notifications.
    pub notifier: Arc<dyn CaseNotifier>,
    /// Item matching knobs.
    pub item_match: ItemMatchOptions,
}

impl Activities {
    /// Download the upload, keep the `incoming/` copy, and make sure the
    /// case document exists in `processing`.
    pub async fn store_file(&self, input: &WorkflowInput) -> Result<StoredUpload, ActivityError> {
        let bytes = self.blobs.fetch(&input.blob_url).await?;
        let sha256 = hex_sha256(&bytes);

        match self.cases.read(&input.tenant_id, input.case_id).await {
            Ok(case) => {
                // Reupload path: the case exists and resumes processing.
                if case.status == CaseStatus::AwaitingInput {
                    self.cases
                        .transition(
                            &input.tenant_id,
                            input.case_id,
                            CaseStatus::Processing,
                            "workflow",
                        )
                        .await?;
                }
            }
            Err(StoreError::NotFound { .. }) => {
                let case = Case::new(
                    input.case_id,
                    &input.tenant_id,
                    SourceMeta {
                        filename: input.filename.clone(),
                        sha256: sha256.clone(),
                        uploader: input.user_id.clone(),
                        chat: input.chat.clone(),
                    },
                );
                match self.cases.create(case, "workflow").await {
                    Ok(()) | Err(StoreError::Duplicate { .. }) => {}
                    Err(other) => return Err(other.into()),
                }
            }
            Err(other) => return Err(other.into()),
        }

        self.blobs.put_incoming(input.case_id, &bytes).await?;
        info!(case_id = %input.case_id, bytes = bytes.len(), "upload stored");
        Ok(StoredUpload { bytes, sha256 })
    }

    /// Parse the stored upload and attach the order to the case.
    pub async fn parse_file(
        &self,
        input: &WorkflowInput,
        upload: &StoredUpload,
    ) -> Result<CanonicalOrder, ActivityError> {
        let case = self.cases.read(&input.tenant_id, input.case_id).await?;
        let source = SourceInfo {
            case_id: input.case_id,
            tenant_id: input.tenant_id.clone(),
            received_at: case.created_at,
            filename: input.filename.clone(),
            sha256: upload.sha256.clone(),
        };
        let order = self.parser.parse(&upload.bytes, &source).await;
        self.cases
            .set_order(&input.tenant_id, input.case_id, order.clone(), "parser")
            .await?;
        Ok(order)
    }

    /// Ask the committee to review the inferred mapping.
    pub async fn run_committee(
        &self,
        order: &CanonicalOrder,
    ) -> Result<CommitteeVerdict, ActivityError> {
        let sample_rows = order
            .line_items
            .iter()
            .take(3)
            .map(|line| {
                [&line.sku, &line.product_name]
                    .iter()
                    .filter_map(|f| f.as_ref().map(|s| s.value().clone()))
                    .chain(line.quantity.iter().map(|q| q.value().to_string()))
                    .collect()
            })
            .collect();
        let verdict = self
            .committee
            .review(CommitteeRequest {
                mappings: order.schema_inference.mappings.clone(),
                sample_rows,
                language_hint: order.meta.language_hint,
            })
            .await?;
        Ok(verdict)
    }

    /// Match the order's customer against the customer catalog.
    pub async fn resolve_customer(
        &self,
        order: &CanonicalOrder,
    ) -> Result<CustomerMatch, ActivityError> {
        let snapshot = self.catalogs.snapshot().await;
        let input_name = order
            .customer
            .input_name
            .as_ref()
            .map(|s| s.value().as_str())
            .unwrap_or_default();
        Ok(match_customer(input_name, &snapshot.customers))
    }

    /// Match every line against the item catalog.
    pub async fn resolve_items(
        &self,
        order: &CanonicalOrder,
    ) -> Result<Vec<(usize, ItemMatch)>, ActivityError> {
        let snapshot = self.catalogs.snapshot().await;
        Ok(order
            .line_items
            .iter()
            .map(|line| {
                let matched = match_item(
                    line.sku.as_ref().map(|s| s.value().as_str()),
                    line.gtin.as_ref().map(|s| s.value().as_str()),
                    line.product_name.as_ref().map(|s| s.value().as_str()),
                    &snapshot.items,
                    self.item_match,
                );
                (line.row_index, matched)
            })
            .collect())
    }

    /// Assemble the draft the accounting client will POST. Rates come
    /// from the sheet when present, the catalog otherwise, so the same
    /// inputs always hash to the same fingerprint.
    async fn build_draft(
        &self,
        order: &CanonicalOrder,
        customer_id: &str,
        item_resolutions: &std::collections::BTreeMap<usize, String>,
    ) -> Result<DraftOrder, ActivityError> {
        let snapshot = self.catalogs.snapshot().await;
        let mut lines = Vec::with_capacity(order.line_items.len());
        for line in &order.line_items {
            let Some(item_id) = item_resolutions.get(&line.row_index) else {
                return Err(ActivityError::Fatal(format!(
                    "line {} has no resolved item",
                    line.row_index
                )));
            };
            let Some(quantity) = line.quantity.as_ref().map(|q| *q.value()) else {
                return Err(ActivityError::Fatal(format!(
                    "line {} has no quantity",
                    line.row_index
                )));
            };
            let rate = line
                .unit_price
                .as_ref()
                .map(|p| *p.value())
                .or_else(|| {
                    snapshot
                        .items
                        .iter()
                        .find(|i| &i.id == item_id)
                        .map(|i| i.rate)
                })
                .unwrap_or_default();
            lines.push(DraftLine {
                item_id: item_id.clone(),
                quantity,
                rate,
            });
        }

        Ok(DraftOrder {
            case_id: order.meta.case_id,
            customer_id: customer_id.to_string(),
            lines,
            date: order.meta.received_at.date_naive(),
            reference: format!("case-{}", order.meta.case_id),
        })
    }

    /// Build and create the draft. Queue handoff and idempotency live in
    /// the accounting client; this level makes exactly one attempt.
    pub async fn create_draft(
        &self,
        order: &CanonicalOrder,
        customer_id: &str,
        item_resolutions: &std::collections::BTreeMap<usize, String>,
    ) -> Result<DraftOutcome, ActivityError> {
        let draft = self.build_draft(order, customer_id, item_resolutions).await?;
        Ok(self.drafts.create_draft(&draft).await)
    }

    /// Clear an uncommitted fingerprint during compensation.
    ///
    /// A partial resolution set means no fingerprint was ever reserved, so
    /// there is nothing to clear.
    pub async fn clear_fingerprint(
        &self,
        order: &CanonicalOrder,
        customer_id: &str,
        item_resolutions: &std::collections::BTreeMap<usize, String>,
    ) {
        if let Ok(draft) = self.build_draft(order, customer_id, item_resolutions).await {
            self.drafts.clear_fingerprint(&draft).await;
        }
    }

    /// Notify the user about the case.
    pub async fn notify(
        &self,
        case_id: Uuid,
        kind: NoticeKind,
        message: &str,
    ) -> Result<(), ActivityError> {
        self.notifier
            .notify_case(case_id, kind, message)
            .await
            .map_err(|e| ActivityError::Retryable(e.reason))
    }
}

/// SHA-256 as lowercase hex.
pub fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
