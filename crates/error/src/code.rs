use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following the QL-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Connection and environment errors (fatal to a cycle)
/// - **2000-2999**: Query definition and row errors (contained)
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Ingestion errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Connection / Environment (1000-1999) ===
    /// QL-1001: Could not reach or talk to the database
    ConnectivityError = 1001,
    /// QL-1101: Engine major version is outside the supported set
    UnsupportedVersion = 1101,
    /// QL-1102: Capability probes rejected the environment
    UnsupportedEnvironment = 1102,

    // === Query / Row (2000-2999) ===
    /// QL-2001: Query definition names an unknown record category
    UnknownCategory = 2001,
    /// QL-2002: A row could not be bound into its record type
    RowBindError = 2002,
    /// QL-2003: A diagnostic statement failed
    QueryFailed = 2003,

    // === Configuration (3000-3999) ===
    /// QL-3001: Invalid probe configuration
    InvalidConfig = 3001,
    /// QL-3002: Invalid query definition file
    InvalidQueryDefinition = 3002,

    // === Ingestion (4000-4999) ===
    /// QL-4001: Delivering a batch to the sink failed
    IngestionError = 4001,

    // === Internal (5000-5999) ===
    /// QL-5001: Retry budget spent without a success
    RetryExhausted = 5001,
    /// QL-5002: Serialization/deserialization failed
    SerializationFailed = 5002,
    /// QL-5003: Unexpected internal state
    InternalPanic = 5003,

    /// QL-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Formatted code string (e.g., "QL-2001")
    pub fn as_str(&self) -> String {
        format!("QL-{:04}", self.as_u16())
    }

    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Environment,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::Config,
            4000..=4999 => ErrorCategory::Ingestion,
            _ => ErrorCategory::Internal,
        }
    }

    /// Whether an error with this code ends the whole analysis cycle.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::Environment)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("QL-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::ConnectivityError),
            1101 => Ok(Self::UnsupportedVersion),
            1102 => Ok(Self::UnsupportedEnvironment),
            2001 => Ok(Self::UnknownCategory),
            2002 => Ok(Self::RowBindError),
            2003 => Ok(Self::QueryFailed),
            3001 => Ok(Self::InvalidConfig),
            3002 => Ok(Self::InvalidQueryDefinition),
            4001 => Ok(Self::IngestionError),
            5001 => Ok(Self::RetryExhausted),
            5002 => Ok(Self::SerializationFailed),
            5003 => Ok(Self::InternalPanic),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// Coarse error grouping, also used to pick process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Environment,
    Query,
    Config,
    Ingestion,
    Internal,
}
