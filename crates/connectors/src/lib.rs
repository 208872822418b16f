//! Database connections for the querylens probe.
//!
//! The analysis pipeline only needs one capability from a database: run a fully
//! substituted statement and hand back its rows. That capability is the
//! [`DiagnosticConnection`] trait.
//!
//! # Implementations
//!
//! | Connection | Module | Description |
//! |------------|--------|-------------|
//! | `MssqlConnection` | `mssql` | SQL Server over TDS (`tiberius`), feature `mssql` |
//! | `MemoryConnection` | `memory` | Scripted responses matched by SQL fragment |

use async_trait::async_trait;
use querylens_common::models::Row;
use querylens_error::Result;

pub mod memory;
#[cfg(feature = "mssql")]
pub mod mssql;

pub use memory::MemoryConnection;
#[cfg(feature = "mssql")]
pub use mssql::MssqlConnection;

#[async_trait]
pub trait DiagnosticConnection: Send + Sync {
    /// Short label used in logs (e.g., "mssql", "memory")
    fn kind(&self) -> &'static str;

    /// Execute one statement and return the rows of its first result set.
    ///
    /// Implementations must not run two statements concurrently on the same
    /// underlying session; concurrent callers are serialized.
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;
}
