// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! odx-daemon
//!
//! The HTTP control surface: workflow start/signal/query/cancel, the bot
//! collaborator's `/messages` entry point, case listings, and health.
//! Wire DTOs are camelCase; everything behind them speaks the contract
//! types.

use axum::{
    Json, Router,
    extract::{Path as AxPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use odx_core::{CaseStatus, ChatRef, WorkflowSignal};
use odx_engine::{EngineClient, EngineError};
use odx_store::{CaseFilter, CaseService};
use odx_telemetry::CaseCounters;
use odx_workflow::WorkflowInput;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// State and errors
// ---------------------------------------------------------------------------

/// Shared daemon state, explicitly injected at startup.
#[derive(Clone)]
pub struct AppState {
    /// The workflow engine (local or remote).
    pub engine: Arc<dyn EngineClient>,
    /// Case reads for listings.
    pub cases: CaseService,
    /// Run counters for the health surface.
    pub counters: Arc<CaseCounters>,
    /// When the daemon came up.
    pub started_at: Instant,
}

/// Structured API error with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to return.
    pub status: StatusCode,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    /// Build an error.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::NotFound { .. } | EngineError::UnknownQuery { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            EngineError::Remote { .. } => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Chat reference as the bot sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamsRef {
    /// Chat/conversation id.
    pub chat_id: String,
    /// Message id.
    pub message_id: String,
    /// Activity id.
    pub activity_id: String,
}

impl From<TeamsRef> for ChatRef {
    fn from(t: TeamsRef) -> Self {
        Self {
            chat_id: t.chat_id,
            message_id: t.message_id,
            activity_id: t.activity_id,
        }
    }
}

/// Body of `POST /workflow/start`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Case id (client-assigned; equals the workflow id).
    pub case_id: Uuid,
    /// Where the uploaded workbook lives.
    pub blob_url: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Uploading user.
    pub user_id: String,
    /// Correlation id; defaults to the case id.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Original filename.
    #[serde(default)]
    pub filename: Option<String>,
    /// Chat reference.
    #[serde(default)]
    pub teams: TeamsRef,
}

/// Response of `POST /workflow/start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// The workflow id (equals the case id).
    pub workflow_id: String,
    /// The run id.
    pub run_id: Uuid,
    /// The case id.
    pub case_id: Uuid,
    /// Always `"started"`.
    pub status: String,
}

/// Body of the bot collaborator's `POST /messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Where the attachment was parked.
    pub attachment_url: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Uploading user.
    pub user_id: String,
    /// Original filename.
    #[serde(default)]
    pub filename: Option<String>,
    /// The user's locale.
    #[serde(default)]
    pub locale: Option<String>,
    /// Chat reference.
    #[serde(default)]
    pub teams: TeamsRef,
}

/// Status response for `GET /workflow/{id}/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// The workflow id.
    pub workflow_id: String,
    /// The run id.
    pub run_id: Uuid,
    /// Engine runtime status.
    pub status: odx_engine::RuntimeStatus,
    /// The step the workflow reported last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// When the workflow started.
    pub start_time: DateTime<Utc>,
    /// When it closed, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Default)]
struct ReasonBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaseListQuery {
    tenant: String,
    user: String,
    status: Option<CaseStatus>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router with all daemon routes.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/workflow/start", post(cmd_start))
        .route("/workflow/{id}/signal/{name}", post(cmd_signal))
        .route("/workflow/{id}/status", get(cmd_status))
        .route("/workflow/{id}/query/{name}", get(cmd_query))
        .route("/workflow/{id}/cancel", post(cmd_cancel))
        .route("/workflow/{id}/terminate", post(cmd_terminate))
        .route("/messages", post(cmd_messages))
        .route("/cases", get(cmd_cases))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn cmd_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "engine": "connected",
        "uptime": state.started_at.elapsed().as_secs(),
        "counters": state.counters.snapshot(),
    }))
}

async fn cmd_start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let input = WorkflowInput {
        case_id: req.case_id,
        tenant_id: req.tenant_id,
        user_id: req.user_id,
        blob_url: req.blob_url,
        filename: req.filename.unwrap_or_else(|| "upload.xlsx".into()),
        correlation_id: req
            .correlation_id
            .unwrap_or_else(|| req.case_id.to_string()),
        chat: req.teams.into(),
        locale: None,
    };
    start_case(&state, input).await
}

async fn cmd_messages(
    State(state): State<AppState>,
    Json(msg): Json<InboundMessage>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let case_id = Uuid::new_v4();
    let input = WorkflowInput {
        case_id,
        tenant_id: msg.tenant_id,
        user_id: msg.user_id,
        blob_url: msg.attachment_url,
        filename: msg.filename.unwrap_or_else(|| "upload.xlsx".into()),
        correlation_id: case_id.to_string(),
        chat: msg.teams.into(),
        locale: msg.locale,
    };
    start_case(&state, input).await
}

async fn start_case(
    state: &AppState,
    input: WorkflowInput,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let workflow_id = input.case_id.to_string();
    let case_id = input.case_id;
    let payload = serde_json::to_value(&input)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let run_id = state.engine.start(&workflow_id, payload).await?;
    state.counters.case_started();
    info!(case_id = %case_id, run_id = %run_id, "workflow started");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            workflow_id,
            run_id,
            case_id,
            status: "started".into(),
        }),
    ))
}

async fn cmd_signal(
    State(state): State<AppState>,
    AxPath((id, name)): AxPath<(String, String)>,
    body: Option<Json<Value>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let payload = body.map(|Json(v)| v).unwrap_or(Value::Null);

    // Validate against the closed signal set up front; contract
    // violations drop with a log and are acknowledged, not failed.
    match WorkflowSignal::parse(&name, payload.clone()) {
        Ok(_) => state.engine.signal(&id, &name, payload).await?,
        Err(err) => {
            warn!(workflow_id = %id, signal = %name, error = %err, "signal dropped");
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "workflowId": id,
            "signalName": name,
            "status": "signal_sent",
        })),
    ))
}

async fn cmd_status(
    State(state): State<AppState>,
    AxPath(id): AxPath<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state.engine.status(&id).await?;
    Ok(Json(StatusResponse {
        workflow_id: status.workflow_id,
        run_id: status.run_id,
        status: status.status,
        current_step: status.current_step,
        start_time: status.started_at,
        close_time: status.closed_at,
    }))
}

async fn cmd_query(
    State(state): State<AppState>,
    AxPath((id, name)): AxPath<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.engine.query(&id, &name).await?))
}

async fn cmd_cancel(
    State(state): State<AppState>,
    AxPath(id): AxPath<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<Value>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "cancelled by user".into());
    state.engine.cancel(&id, &reason).await?;
    state.counters.case_cancelled();
    Ok(Json(json!({
        "workflowId": id,
        "status": "cancelled",
        "reason": reason,
    })))
}

async fn cmd_terminate(
    State(state): State<AppState>,
    AxPath(id): AxPath<String>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<Value>, ApiError> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "terminated by operator".into());
    state.engine.terminate(&id, &reason).await?;
    Ok(Json(json!({
        "workflowId": id,
        "status": "terminated",
        "reason": reason,
    })))
}

async fn cmd_cases(
    State(state): State<AppState>,
    Query(query): Query<CaseListQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = CaseFilter {
        status: query.status,
        since: None,
    };
    let cases = state
        .cases
        .list_by_user(&query.tenant, &query.user, &filter)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let summaries: Vec<Value> = cases
        .iter()
        .map(|c| {
            json!({
                "caseId": c.case_id,
                "status": c.status,
                "filename": c.source.filename,
                "draftId": c.draft_id,
                "issues": c.issues.len(),
                "createdAt": c.created_at,
                "updatedAt": c.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "cases": summaries })))
}
