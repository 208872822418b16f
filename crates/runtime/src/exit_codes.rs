//! Structured exit codes for the probe binary.
//!
//! These codes let the scheduler running the probe tell failure types apart.

use querylens_error::{ErrorCategory, ErrorCode, QueryLensError};

/// Success (standard convention)
pub const SUCCESS: i32 = 0;

/// General error (fallback for unknown errors)
pub const GENERAL_ERROR: i32 = 1;

/// Configuration error (YAML parse failure, invalid settings, bad query definitions)
pub const CONFIG_ERROR: i32 = 3;

/// Connection error (server unreachable, timeout, login failure)
pub const CONNECTION_ERROR: i32 = 4;

/// Environment rejected by the precondition checks
pub const UNSUPPORTED_ENVIRONMENT: i32 = 5;

/// Partial failure (the cycle ran but some query definitions failed)
pub const PARTIAL_FAILURE: i32 = 8;

pub fn for_error(err: &QueryLensError) -> i32 {
    match err.code {
        ErrorCode::ConnectivityError => CONNECTION_ERROR,
        ErrorCode::UnsupportedVersion | ErrorCode::UnsupportedEnvironment => {
            UNSUPPORTED_ENVIRONMENT
        }
        code if code.category() == ErrorCategory::Config => CONFIG_ERROR,
        _ => GENERAL_ERROR,
    }
}
