// SPDX-License-Identifier: MIT OR Apache-2.0
//! The remote HTTP adapter.
//!
//! A thin reqwest client against an external workflow-control surface
//! exposing the same start/signal/query/cancel/status contract. Which
//! durable runtime answers on the other side is a deployment concern.

use crate::{EngineClient, EngineError, WorkflowStatus};
use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

/// reqwest-backed [`EngineClient`].
pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngineClient {
    /// Build a client against the engine's control-plane address.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn remote_err(err: impl std::fmt::Display) -> EngineError {
        EngineError::Remote {
            reason: err.to_string(),
        }
    }

    async fn expect_ok(
        response: reqwest::Response,
        workflow_id: &str,
    ) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound {
                workflow_id: workflow_id.to_string(),
            });
        }
        if status == reqwest::StatusCode::CONFLICT {
            return Err(EngineError::AlreadyRunning {
                workflow_id: workflow_id.to_string(),
            });
        }
        Err(EngineError::Remote {
            reason: format!("engine returned HTTP {status}"),
        })
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn start(&self, workflow_id: &str, input: Value) -> Result<Uuid, EngineError> {
        let response = self
            .client
            .post(format!("{}/workflow/start", self.base_url))
            .json(&json!({"workflow_id": workflow_id, "input": input}))
            .send()
            .await
            .map_err(Self::remote_err)?;
        let response = Self::expect_ok(response, workflow_id).await?;
        let body: Value = response.json().await.map_err(Self::remote_err)?;
        body.get("run_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| EngineError::Remote {
                reason: "start response missing run_id".into(),
            })
    }

    async fn signal(
        &self,
        workflow_id: &str,
        name: &str,
        payload: Value,
    ) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!(
                "{}/workflow/{workflow_id}/signal/{name}",
                self.base_url
            ))
            .json(&payload)
            .send()
            .await
            .map_err(Self::remote_err)?;
        Self::expect_ok(response, workflow_id).await.map(|_| ())
    }

    async fn query(&self, workflow_id: &str, name: &str) -> Result<Value, EngineError> {
        let response = self
            .client
            .get(format!(
                "{}/workflow/{workflow_id}/query/{name}",
                self.base_url
            ))
            .send()
            .await
            .map_err(Self::remote_err)?;
        let response = Self::expect_ok(response, workflow_id).await?;
        response.json().await.map_err(Self::remote_err)
    }

    async fn cancel(&self, workflow_id: &str, reason: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}/workflow/{workflow_id}/cancel", self.base_url))
            .json(&json!({"reason": reason}))
            .send()
            .await
            .map_err(Self::remote_err)?;
        Self::expect_ok(response, workflow_id).await.map(|_| ())
    }

    async fn terminate(&self, workflow_id: &str, reason: &str) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!(
                "{}/workflow/{workflow_id}/terminate",
                self.base_url
            ))
            .json(&json!({"reason": reason}))
            .send()
            .await
            .map_err(Self::remote_err)?;
        Self::expect_ok(response, workflow_id).await.map(|_| ())
    }

    async fn status(&self, workflow_id: &str) -> Result<WorkflowStatus, EngineError> {
        let response = self
            .client
            .get(format!("{}/workflow/{workflow_id}/status", self.base_url))
            .send()
            .await
            .map_err(Self::remote_err)?;
        let response = Self::expect_ok(response, workflow_id).await?;
        response.json().await.map_err(Self::remote_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn start_parses_the_run_id() {
        let server = MockServer::start().await;
        let run_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/workflow/start"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "workflow_id": "case-1",
                "run_id": run_id.to_string(),
                "status": "started",
            })))
            .mount(&server)
            .await;

        let client = HttpEngineClient::new(server.uri());
        let got = client.start("case-1", json!({})).await.unwrap();
        assert_eq!(got, run_id);
    }

    #[tokio::test]
    async fn missing_workflow_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workflow/ghost/status"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpEngineClient::new(server.uri());
        let err = client.status("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn signal_posts_the_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflow/case-1/signal/ApprovalReceived"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "workflow_id": "case-1",
                "signal_name": "ApprovalReceived",
                "status": "signal_sent",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpEngineClient::new(server.uri());
        client
            .signal("case-1", "ApprovalReceived", json!({"approved": true}))
            .await
            .unwrap();
    }
}
