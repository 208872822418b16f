//! Typed records bound from diagnostic rows.
//!
//! Every record type knows how to build itself from its raw row shape
//! ([`FromRow`]), which fields hold query text to anonymize, and how to present
//! itself as a flat key/value view for the metric sink ([`ToAttributes`]).

use std::fmt;
use std::str::FromStr;

use querylens_common::models::Row;
use querylens_error::{ErrorCode, ErrorContext, QueryLensError, Result};
use serde::de::DeserializeOwned;

use crate::selection::Ranked;

mod blocking;
mod plan;
mod slow_query;
mod wait_event;

pub use blocking::BlockingPairRecord;
pub use plan::ExecutionPlanRecord;
pub use slow_query::SlowQueryRecord;
pub use wait_event::WaitEventRecord;

/// Closed set of record shapes a query definition can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordCategory {
    SlowQuery,
    WaitEvent,
    BlockingPair,
}

impl RecordCategory {
    pub const ALL: [RecordCategory; 3] = [
        RecordCategory::SlowQuery,
        RecordCategory::WaitEvent,
        RecordCategory::BlockingPair,
    ];

    /// Identifier used in query definition files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordCategory::SlowQuery => "slow_query",
            RecordCategory::WaitEvent => "wait_event",
            RecordCategory::BlockingPair => "blocking_pair",
        }
    }

    /// Slow queries go through top-K selection and the correlated plan fetch.
    pub fn is_ranked(&self) -> bool {
        matches!(self, RecordCategory::SlowQuery)
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordCategory {
    type Err = QueryLensError;

    fn from_str(s: &str) -> Result<Self> {
        RecordCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                QueryLensError::new(
                    ErrorCode::UnknownCategory,
                    format!("Unknown record category '{}'", s),
                )
            })
    }
}

/// Flat key/value view of a record. Fields with no value are omitted.
pub trait ToAttributes {
    fn attributes(&self) -> Vec<(&'static str, String)>;
}

/// Construction of a record from its raw row shape.
pub trait FromRow: Sized {
    /// Column layout as returned by the diagnostic query.
    type Raw: DeserializeOwned;

    /// Validate and derive computed fields. The error message explains why the
    /// row is rejected.
    fn from_raw(raw: Self::Raw) -> std::result::Result<Self, String>;

    /// Replace literals in every query-text field.
    fn anonymize(&mut self) {}
}

/// Bind one raw row into `T`: deserialize, convert, anonymize.
pub fn bind_row<T: FromRow>(row: Row, category: &str, row_index: usize) -> Result<T> {
    let bind_error = |message: String| {
        QueryLensError::new(ErrorCode::RowBindError, message).with_context(ErrorContext::RowBind {
            category: category.to_string(),
            row_index,
        })
    };

    let raw: T::Raw = serde_json::from_value(row.into_value())
        .map_err(|e| bind_error(format!("Row shape mismatch: {}", e)))?;
    let mut record = T::from_raw(raw).map_err(bind_error)?;
    record.anonymize();
    Ok(record)
}

/// A bound record of one of the declared categories.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    SlowQuery(SlowQueryRecord),
    WaitEvent(WaitEventRecord),
    BlockingPair(BlockingPairRecord),
}

impl Record {
    pub fn category(&self) -> RecordCategory {
        match self {
            Record::SlowQuery(_) => RecordCategory::SlowQuery,
            Record::WaitEvent(_) => RecordCategory::WaitEvent,
            Record::BlockingPair(_) => RecordCategory::BlockingPair,
        }
    }

    /// Key linking the record to a more detailed follow-up fetch.
    pub fn correlation_key(&self) -> Option<&str> {
        match self {
            Record::SlowQuery(r) => Some(r.query_id.as_str()),
            Record::WaitEvent(r) => r.query_id.as_deref(),
            Record::BlockingPair(_) => None,
        }
    }
}

impl Ranked for Record {
    fn cost(&self) -> f64 {
        match self {
            Record::SlowQuery(r) => r.avg_elapsed_time_ms,
            Record::WaitEvent(r) => r.avg_wait_time_ms,
            Record::BlockingPair(r) => r.wait_time_ms,
        }
    }
}

impl ToAttributes for Record {
    fn attributes(&self) -> Vec<(&'static str, String)> {
        match self {
            Record::SlowQuery(r) => r.attributes(),
            Record::WaitEvent(r) => r.attributes(),
            Record::BlockingPair(r) => r.attributes(),
        }
    }
}

impl From<SlowQueryRecord> for Record {
    fn from(r: SlowQueryRecord) -> Self {
        Record::SlowQuery(r)
    }
}

impl From<WaitEventRecord> for Record {
    fn from(r: WaitEventRecord) -> Self {
        Record::WaitEvent(r)
    }
}

impl From<BlockingPairRecord> for Record {
    fn from(r: BlockingPairRecord) -> Self {
        Record::BlockingPair(r)
    }
}

/// Append `key=value` when the value is present.
pub(crate) fn push_opt<T: ToString>(
    attrs: &mut Vec<(&'static str, String)>,
    key: &'static str,
    value: &Option<T>,
) {
    if let Some(v) = value {
        attrs.push((key, v.to_string()));
    }
}

/// Divide a total by a positive count; `None` when either side is unknown.
pub(crate) fn average(total: Option<f64>, count: u64) -> Option<f64> {
    total.filter(|_| count > 0).map(|t| t / count as f64)
}

/// Reject zero or negative counts before any averaging happens.
pub(crate) fn positive_count(field: &str, count: i64) -> std::result::Result<u64, String> {
    u64::try_from(count)
        .ok()
        .filter(|c| *c > 0)
        .ok_or_else(|| format!("{} must be positive, got {}", field, count))
}
