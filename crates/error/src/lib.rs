//! # querylens-error
//!
//! Unified error type for the querylens probe.
//!
//! Every error carries:
//! - A stable numeric code (QL-XXXX) whose range tells the orchestrator how far the
//!   failure propagates (whole cycle, one query definition, one row, one batch)
//! - Optional structured context for machine-readable logs
//! - An optional hint for the operator

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;
pub use convert::find_closest_match;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLensError {
    /// Numeric error code (e.g., "QL-2001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for the operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl QueryLensError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectivityError, message)
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueryFailed, message)
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Whether this error aborts the whole analysis cycle rather than one definition.
    pub fn is_cycle_fatal(&self) -> bool {
        self.code.is_cycle_fatal()
    }

    /// Serialize to JSON for structured log sinks
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize QueryLensError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for QueryLensError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryLensError {}

/// Result type alias for querylens operations
pub type Result<T> = std::result::Result<T, QueryLensError>;
