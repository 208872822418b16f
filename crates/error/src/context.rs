//! # Error Contexts
//!
//! Structured metadata attached to errors so logs and reports can be filtered by field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for QL-1101/1102 (validator rejection)
    Environment {
        major_version: Option<u32>,
        supported_versions: Vec<u32>,
        failed_checks: Vec<String>,
    },

    /// Context for QL-2001 (UnknownCategory)
    UnknownCategory {
        definition: String,
        category: String,
        known_categories: Vec<String>,
    },

    /// Context for QL-2002 (RowBindError)
    RowBind {
        category: String,
        row_index: usize,
    },

    /// Context for QL-4001 (IngestionError). `start..end` is the failing range.
    Ingestion {
        event_type: String,
        start: usize,
        end: usize,
        total: usize,
    },

    /// Context for QL-5001 (RetryExhausted)
    Retry {
        operation: String,
        attempts: u32,
    },

    /// Context for configuration errors (QL-3001, 3002)
    Config {
        file_path: Option<String>,
        field: Option<String>,
    },
}
