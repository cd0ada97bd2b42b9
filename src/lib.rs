// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orderdesk: spreadsheet-to-draft sales order processing.
//!
//! This facade re-exports the workspace crates under one name. Depend on
//! the individual `odx-*` crates when you only need a slice of the
//! system.

#![deny(unsafe_code)]

pub use odx_books as books;
pub use odx_config as config;
pub use odx_core as contract;
pub use odx_daemon as daemon;
pub use odx_engine as engine;
pub use odx_match as matching;
pub use odx_parser as parser;
pub use odx_relay as relay;
pub use odx_retry as retry;
pub use odx_store as store;
pub use odx_telemetry as telemetry;
pub use odx_workflow as workflow;
