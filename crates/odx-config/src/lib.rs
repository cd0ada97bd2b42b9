// SPDX-License-Identifier: MIT OR Apache-2.0
//! Configuration loading and validation for the Orderdesk daemon.
//!
//! Everything comes from environment variables with documented defaults.
//! Loading never panics: hard problems are [`ConfigError`]s, soft ones are
//! advisory [`ConfigWarning`]s the caller logs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Errors and warnings
// ---------------------------------------------------------------------------

/// Errors that prevent the daemon from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value of the wrong shape.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Semantic validation failed.
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory findings that do not prevent startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended variable is missing and a default was assumed.
    MissingOptional {
        /// Variable name.
        var: String,
        /// The default that was used.
        default: String,
    },
    /// A timeout ordering looks wrong but is usable.
    SuspiciousTimeouts {
        /// Explanation.
        detail: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptional { var, default } => {
                write!(f, "{var} not set; assuming '{default}'")
            }
            ConfigWarning::SuspiciousTimeouts { detail } => f.write_str(detail),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Everything the daemon needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// Workflow-engine control-plane address (`ENGINE_ADDRESS`). Empty
    /// means the in-process engine.
    pub engine_address: String,
    /// Engine namespace (`ENGINE_NAMESPACE`).
    pub engine_namespace: String,
    /// Engine task queue (`TASK_QUEUE`).
    pub task_queue: String,
    /// HTTP listen port (`PORT`).
    pub port: u16,
    /// Document-store endpoint (`DOC_DB_ENDPOINT`). Empty means in-memory.
    pub doc_db_endpoint: String,
    /// Document-store database name (`DOC_DB_DATABASE`).
    pub doc_db_database: String,
    /// Blob storage connection string (`BLOB_CONNECTION_STRING`).
    pub blob_connection_string: String,
    /// Out-of-process parser address (`PARSER_URL`). Empty means in-process.
    pub parser_url: String,
    /// Committee collaborator address (`COMMITTEE_URL`).
    pub committee_url: String,
    /// Accounting-system address (`ACCOUNTING_URL`).
    pub accounting_url: String,
    /// Chat-bot collaborator address (`BOT_URL`).
    pub bot_url: String,
    /// Hours before the first reminder (`TIMEOUT_REMINDER_HOURS`).
    pub timeout_reminder_hours: u64,
    /// Hours before escalation (`TIMEOUT_ESCALATION_HOURS`).
    pub timeout_escalation_hours: u64,
    /// Days before a waiting workflow fails (`TIMEOUT_MAX_WAIT_DAYS`).
    pub timeout_max_wait_days: u64,
    /// Log level (`LOG_LEVEL`).
    pub log_level: String,
    /// Maximum accepted upload size in bytes.
    pub max_file_bytes: usize,
    /// Maximum extracted rows per sheet.
    pub max_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine_address: String::new(),
            engine_namespace: "orderdesk".into(),
            task_queue: "orderdesk-orders".into(),
            port: 8087,
            doc_db_endpoint: String::new(),
            doc_db_database: "orderdesk".into(),
            blob_connection_string: String::new(),
            parser_url: String::new(),
            committee_url: String::new(),
            accounting_url: String::new(),
            bot_url: String::new(),
            timeout_reminder_hours: 24,
            timeout_escalation_hours: 48,
            timeout_max_wait_days: 7,
            log_level: "info".into(),
            max_file_bytes: 10 * 1024 * 1024,
            max_rows: 10_000,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Load from an explicit variable map (testable).
    pub fn from_vars(
        vars: &HashMap<String, String>,
    ) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        let mut take = |var: &str, slot: &mut String| {
            if let Some(value) = vars.get(var) {
                *slot = value.clone();
            }
        };
        take("ENGINE_ADDRESS", &mut config.engine_address);
        take("ENGINE_NAMESPACE", &mut config.engine_namespace);
        take("TASK_QUEUE", &mut config.task_queue);
        take("DOC_DB_ENDPOINT", &mut config.doc_db_endpoint);
        take("DOC_DB_DATABASE", &mut config.doc_db_database);
        take("BLOB_CONNECTION_STRING", &mut config.blob_connection_string);
        take("PARSER_URL", &mut config.parser_url);
        take("COMMITTEE_URL", &mut config.committee_url);
        take("ACCOUNTING_URL", &mut config.accounting_url);
        take("BOT_URL", &mut config.bot_url);
        take("LOG_LEVEL", &mut config.log_level);

        config.port = parse_var(vars, "PORT", config.port)?;
        config.timeout_reminder_hours =
            parse_var(vars, "TIMEOUT_REMINDER_HOURS", config.timeout_reminder_hours)?;
        config.timeout_escalation_hours = parse_var(
            vars,
            "TIMEOUT_ESCALATION_HOURS",
            config.timeout_escalation_hours,
        )?;
        config.timeout_max_wait_days =
            parse_var(vars, "TIMEOUT_MAX_WAIT_DAYS", config.timeout_max_wait_days)?;

        if !vars.contains_key("ACCOUNTING_URL") {
            warnings.push(ConfigWarning::MissingOptional {
                var: "ACCOUNTING_URL".into(),
                default: "(disabled)".into(),
            });
        }
        if !vars.contains_key("BOT_URL") {
            warnings.push(ConfigWarning::MissingOptional {
                var: "BOT_URL".into(),
                default: "(log-only notifications)".into(),
            });
        }

        config.validate()?;

        if config.timeout_escalation_hours <= config.timeout_reminder_hours {
            warnings.push(ConfigWarning::SuspiciousTimeouts {
                detail: format!(
                    "escalation ({}) does not come after the reminder ({})",
                    config.timeout_escalation_hours, config.timeout_reminder_hours
                ),
            });
        }

        Ok((config, warnings))
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();
        if self.port == 0 {
            reasons.push("PORT must be non-zero".to_string());
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            reasons.push(format!(
                "LOG_LEVEL '{}' is not one of {VALID_LOG_LEVELS:?}",
                self.log_level
            ));
        }
        if self.timeout_max_wait_days == 0 {
            reasons.push("TIMEOUT_MAX_WAIT_DAYS must be at least 1".to_string());
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError { reasons })
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    var: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match vars.get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("'{raw}': {e}"),
        }),
    }
}
