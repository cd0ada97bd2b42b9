// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chat notification contracts.
//!
//! The workflow talks to the user through [`CaseNotifier`]; the outbox
//! publisher delivers events through [`Notifier`](odx_relay::Notifier).
//! [`HttpBotClient`] implements both against the bot collaborator, and
//! [`LogNotifier`] is the log-only stand-in.

use async_trait::async_trait;
use odx_relay::{NotifyError, Notifier, OutboxEvent};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    /// The case needs input from the user.
    InputNeeded,
    /// First timer tick: gentle reminder.
    Reminder,
    /// Second timer tick: manager escalation.
    Escalation,
    /// The draft was created.
    DraftCreated,
    /// The attempt is parked in the retry queue.
    DraftQueued,
    /// The case was cancelled.
    Cancelled,
    /// The case failed.
    Failed,
}

/// A notification failure.
#[derive(Debug, thiserror::Error)]
#[error("case notification failed: {reason}")]
pub struct NotifyFailure {
    /// What went wrong.
    pub reason: String,
}

/// Direct user notifications from the workflow.
#[async_trait]
pub trait CaseNotifier: Send + Sync {
    /// Tell the user (or the escalation channel) about the case.
    async fn notify_case(
        &self,
        case_id: Uuid,
        kind: NoticeKind,
        message: &str,
    ) -> Result<(), NotifyFailure>;
}

// ---------------------------------------------------------------------------
// Log-only implementation
// ---------------------------------------------------------------------------

/// Logs notifications instead of delivering them. Default when `BOT_URL`
/// is unset.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl CaseNotifier for LogNotifier {
    async fn notify_case(
        &self,
        case_id: Uuid,
        kind: NoticeKind,
        message: &str,
    ) -> Result<(), NotifyFailure> {
        info!(case_id = %case_id, ?kind, message, "case notification");
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OutboxEvent) -> Result<(), NotifyError> {
        info!(case_id = %event.case_id, event_type = ?event.event_type, "outbox event");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// reqwest-backed client for the bot collaborator.
pub struct HttpBotClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBotClient {
    /// Build a client against the bot's address.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), String> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", response.status()))
        }
    }
}

#[async_trait]
impl CaseNotifier for HttpBotClient {
    async fn notify_case(
        &self,
        case_id: Uuid,
        kind: NoticeKind,
        message: &str,
    ) -> Result<(), NotifyFailure> {
        self.post(
            "/notify",
            serde_json::json!({
                "case_id": case_id,
                "kind": kind,
                "message": message,
            }),
        )
        .await
        .map_err(|reason| NotifyFailure { reason })
    }
}

#[async_trait]
impl Notifier for HttpBotClient {
    async fn notify(&self, event: &OutboxEvent) -> Result<(), NotifyError> {
        self.post(
            "/events",
            serde_json::json!({
                "event_id": event.id,
                "case_id": event.case_id,
                "event_type": event.event_type,
                "payload": event.payload,
            }),
        )
        .await
        .map_err(|message| NotifyError { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn bot_client_posts_notifications() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let bot = HttpBotClient::new(server.uri());
        bot.notify_case(Uuid::nil(), NoticeKind::Reminder, "still waiting")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bot_client_reports_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let bot = HttpBotClient::new(server.uri());
        let err = bot
            .notify_case(Uuid::nil(), NoticeKind::Reminder, "still waiting")
            .await
            .unwrap_err();
        assert!(err.reason.contains("502"));
    }
}
