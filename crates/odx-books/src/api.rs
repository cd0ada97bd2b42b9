// SPDX-License-Identifier: MIT OR Apache-2.0
//! The accounting API surface.
//!
//! [`BooksApi`] is the seam the rest of the system depends on;
//! [`HttpBooksApi`] is the reqwest implementation against the real
//! service. Error classification lives here so every caller retries the
//! same way.

use crate::auth::TokenCache;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use odx_core::{CustomerRecord, ItemRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from accounting-system calls, classified for retry handling.
#[derive(Debug, thiserror::Error)]
pub enum BooksError {
    /// HTTP 429. Honour `retry_after` when the server provided one.
    #[error("rate limited by the accounting system")]
    RateLimited {
        /// Parsed `Retry-After` value, when present.
        retry_after: Option<Duration>,
    },

    /// Timeouts, connection failures, 408, and 5xx responses.
    #[error("transient accounting failure: {reason}")]
    Transient {
        /// What went wrong.
        reason: String,
    },

    /// 4xx responses other than 408/429: retrying will not help.
    #[error("accounting request rejected ({status}): {reason}")]
    Permanent {
        /// HTTP status code.
        status: u16,
        /// Response detail.
        reason: String,
    },

    /// Authentication failed (401) or the token flow broke.
    #[error("accounting authentication failed: {reason}")]
    Auth {
        /// What went wrong.
        reason: String,
    },

    /// The requested entity does not exist (404).
    #[error("accounting entity not found")]
    NotFound,
}

impl BooksError {
    /// `true` when a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

// ---------------------------------------------------------------------------
// Draft shapes
// ---------------------------------------------------------------------------

/// One line of a draft order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    /// Accounting-system item id.
    pub item_id: String,
    /// Ordered quantity.
    pub quantity: f64,
    /// Rate the draft carries.
    pub rate: f64,
}

/// A draft sales order ready for creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrder {
    /// Originating case.
    pub case_id: Uuid,
    /// Resolved customer id.
    pub customer_id: String,
    /// Resolved lines.
    pub lines: Vec<DraftLine>,
    /// Order date (also the fingerprint's date bucket).
    pub date: NaiveDate,
    /// Reference string shown in the accounting system.
    pub reference: String,
}

/// A created draft, as reported by the accounting system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftCreated {
    /// Sales-order id.
    pub id: String,
    /// Human-facing sales-order number.
    pub number: String,
}

// ---------------------------------------------------------------------------
// BooksApi
// ---------------------------------------------------------------------------

/// The accounting operations this system consumes.
#[async_trait]
pub trait BooksApi: Send + Sync {
    /// Full customer catalog.
    async fn list_customers(&self) -> Result<Vec<CustomerRecord>, BooksError>;

    /// Full item catalog.
    async fn list_items(&self) -> Result<Vec<ItemRecord>, BooksError>;

    /// One item by id. `Err(NotFound)` feeds the negative cache.
    async fn get_item(&self, id: &str) -> Result<ItemRecord, BooksError>;

    /// Create a **draft** sales order. Never commits.
    async fn create_draft(&self, order: &DraftOrder) -> Result<DraftCreated, BooksError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// reqwest-backed [`BooksApi`].
pub struct HttpBooksApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
}

impl HttpBooksApi {
    /// Build a client against the given base URL.
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            tokens,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BooksError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(|e| BooksError::Transient {
            reason: format!("decode failed: {e}"),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BooksError {
    // Anything that failed before a status arrived (timeout, connect,
    // broken transport) is worth retrying.
    BooksError::Transient {
        reason: err.to_string(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BooksError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            Err(BooksError::RateLimited { retry_after })
        }
        401 => Err(BooksError::Auth {
            reason: "access token rejected".into(),
        }),
        404 => Err(BooksError::NotFound),
        408 => Err(BooksError::Transient {
            reason: "request timeout".into(),
        }),
        s if (500..600).contains(&s) => {
            let body = response.text().await.unwrap_or_default();
            Err(BooksError::Transient {
                reason: format!("HTTP {s}: {body}"),
            })
        }
        s => {
            let body = response.text().await.unwrap_or_default();
            Err(BooksError::Permanent {
                status: s,
                reason: body,
            })
        }
    }
}

#[async_trait]
impl BooksApi for HttpBooksApi {
    async fn list_customers(&self) -> Result<Vec<CustomerRecord>, BooksError> {
        self.get_json("/customers").await
    }

    async fn list_items(&self) -> Result<Vec<ItemRecord>, BooksError> {
        self.get_json("/items").await
    }

    async fn get_item(&self, id: &str) -> Result<ItemRecord, BooksError> {
        self.get_json(&format!("/items/{id}")).await
    }

    async fn create_draft(&self, order: &DraftOrder) -> Result<DraftCreated, BooksError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(format!("{}/drafts", self.base_url))
            .bearer_auth(token)
            .json(order)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(|e| BooksError::Transient {
            reason: format!("decode failed: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
    }

    #[test]
    fn retry_after_http_date_in_the_past_is_zero() {
        let past = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(past, Duration::ZERO);
    }

    #[test]
    fn retry_after_garbage_is_none() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn transient_classification() {
        assert!(
            BooksError::Transient {
                reason: "x".into()
            }
            .is_transient()
        );
        assert!(BooksError::RateLimited { retry_after: None }.is_transient());
        assert!(
            !BooksError::Permanent {
                status: 400,
                reason: "x".into()
            }
            .is_transient()
        );
        assert!(!BooksError::NotFound.is_transient());
    }
}
