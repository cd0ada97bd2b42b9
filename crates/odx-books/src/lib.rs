// SPDX-License-Identifier: MIT OR Apache-2.0
//! odx-books
//!
//! The accounting-system integration core: an OAuth-managed HTTP client,
//! catalog caches with atomic snapshots, and fingerprint-keyed idempotent
//! draft creation backed by the retry queue and the outbox.
//!
//! Drafts only: nothing in this crate ever commits an order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The HTTP API surface and error taxonomy.
pub mod api;
/// OAuth token management.
pub mod auth;
/// Catalog caches.
pub mod catalog;
/// Idempotent draft creation.
pub mod draft;
/// Fingerprint rows.
pub mod fingerprint;

pub use api::{BooksApi, BooksError, DraftCreated, DraftLine, DraftOrder, HttpBooksApi};
pub use auth::{CredentialStore, OAuthConfig, StaticCredentials, TokenCache};
pub use catalog::{CatalogCache, CatalogSnapshot};
pub use draft::{DraftOutcome, DraftWriter, QueueSettings};
pub use fingerprint::{FingerprintStore, InsertOutcome, MemoryFingerprintStore};
