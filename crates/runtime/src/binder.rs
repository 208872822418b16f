//! Category dispatch for raw diagnostic rows.
//!
//! A query definition names its record category by identifier. The registry
//! resolves that identifier to a [`RowBinder`] once per definition; the binder is
//! then applied to every row of the result set.

use std::collections::HashMap;
use std::marker::PhantomData;

use querylens_common::models::Row;
use querylens_error::{find_closest_match, ErrorCode, ErrorContext, QueryLensError, Result};

use crate::records::{
    bind_row, BlockingPairRecord, FromRow, Record, RecordCategory, SlowQueryRecord,
    WaitEventRecord,
};

pub trait RowBinder: Send + Sync {
    fn category(&self) -> RecordCategory;

    fn bind(&self, row: Row, row_index: usize) -> Result<Record>;
}

/// Binder for any record type that knows how to build itself from a row.
pub struct TypedBinder<T> {
    category: RecordCategory,
    _record: PhantomData<fn() -> T>,
}

impl<T> TypedBinder<T> {
    pub fn new(category: RecordCategory) -> Self {
        Self {
            category,
            _record: PhantomData,
        }
    }
}

impl<T> RowBinder for TypedBinder<T>
where
    T: FromRow + Into<Record>,
{
    fn category(&self) -> RecordCategory {
        self.category
    }

    fn bind(&self, row: Row, row_index: usize) -> Result<Record> {
        bind_row::<T>(row, self.category.as_str(), row_index).map(Into::into)
    }
}

/// Outcome of binding one result set.
#[derive(Debug, Default)]
pub struct BoundRows {
    pub records: Vec<Record>,
    /// Correlation keys of bound slow queries, in row order.
    pub correlation_keys: Vec<String>,
    pub skipped: usize,
}

#[derive(Default)]
pub struct BinderRegistry {
    binders: HashMap<&'static str, Box<dyn RowBinder>>,
}

impl BinderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_binder(&mut self, binder: Box<dyn RowBinder>) {
        self.binders.insert(binder.category().as_str(), binder);
    }

    /// Resolve the binder for `category`, declared by the definition named `definition`.
    pub fn binder_for(&self, definition: &str, category: &str) -> Result<&dyn RowBinder> {
        if let Some(binder) = self.binders.get(category) {
            return Ok(binder.as_ref());
        }

        let mut known: Vec<String> = self.binders.keys().map(|k| k.to_string()).collect();
        known.sort();

        let mut err = QueryLensError::new(
            ErrorCode::UnknownCategory,
            format!(
                "Query definition '{}' declares unknown category '{}'",
                definition, category
            ),
        );
        if let Some(suggestion) = find_closest_match(category, &known) {
            err = err.with_hint(format!("Did you mean '{}'?", suggestion));
        }
        Err(err.with_context(ErrorContext::UnknownCategory {
            definition: definition.to_string(),
            category: category.to_string(),
            known_categories: known,
        }))
    }

    /// Bind every row, skipping the ones that fail.
    pub fn bind_rows(&self, binder: &dyn RowBinder, rows: Vec<Row>) -> BoundRows {
        let mut bound = BoundRows {
            records: Vec::with_capacity(rows.len()),
            ..Default::default()
        };

        for (row_index, row) in rows.into_iter().enumerate() {
            match binder.bind(row, row_index) {
                Ok(record) => {
                    if record.category() == RecordCategory::SlowQuery {
                        if let Some(key) = record.correlation_key() {
                            bound.correlation_keys.push(key.to_string());
                        }
                    }
                    bound.records.push(record);
                }
                Err(e) => {
                    tracing::warn!(
                        category = %binder.category(),
                        row_index,
                        error = %e,
                        "Skipping row that could not be bound"
                    );
                    bound.skipped += 1;
                }
            }
        }

        bound
    }
}

pub fn default_registry() -> BinderRegistry {
    let mut registry = BinderRegistry::new();
    registry.register_binder(Box::new(TypedBinder::<SlowQueryRecord>::new(
        RecordCategory::SlowQuery,
    )));
    registry.register_binder(Box::new(TypedBinder::<WaitEventRecord>::new(
        RecordCategory::WaitEvent,
    )));
    registry.register_binder(Box::new(TypedBinder::<BlockingPairRecord>::new(
        RecordCategory::BlockingPair,
    )));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_row(id: &str, count: i64) -> Row {
        Row::new()
            .with("query_id", id)
            .with("query_text", "SELECT 1")
            .with("execution_count", count)
            .with("total_elapsed_time_ms", 100.0)
    }

    #[test]
    fn test_unknown_category_suggests_closest() {
        let registry = default_registry();
        let err = registry.binder_for("top_queries", "slow_queries").err().unwrap();
        assert_eq!(err.code, ErrorCode::UnknownCategory);
        assert_eq!(err.hint.as_deref(), Some("Did you mean 'slow_query'?"));
    }

    #[test]
    fn test_every_category_has_a_binder() {
        let registry = default_registry();
        for category in RecordCategory::ALL {
            let binder = registry.binder_for("any", category.as_str()).unwrap();
            assert_eq!(binder.category(), category);
        }
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let registry = default_registry();
        let binder = registry.binder_for("top_queries", "slow_query").unwrap();
        let rows = vec![
            slow_row("0x01", 2),
            slow_row("0x02", 0),
            Row::new().with("query_id", "0x03"),
            slow_row("0x04", 5),
        ];

        let bound = registry.bind_rows(binder, rows);
        assert_eq!(bound.records.len(), 2);
        assert_eq!(bound.skipped, 2);
        assert_eq!(bound.correlation_keys, vec!["0x01", "0x04"]);
    }

    #[test]
    fn test_wait_events_collect_no_keys() {
        let registry = default_registry();
        let binder = registry.binder_for("waits", "wait_event").unwrap();
        let row = Row::new()
            .with("query_id", "0x01")
            .with("wait_category", "Latch")
            .with("total_wait_time_ms", 5.0)
            .with("wait_event_count", 1);

        let bound = registry.bind_rows(binder, vec![row]);
        assert_eq!(bound.records.len(), 1);
        assert!(bound.correlation_keys.is_empty());
    }
}
