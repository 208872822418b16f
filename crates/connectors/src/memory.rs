//! Scripted in-memory connection.
//!
//! Responses are matched by SQL fragment in registration order, which keeps tests
//! independent from the exact text of the diagnostic queries.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use querylens_common::models::Row;
use querylens_error::{QueryLensError, Result};

use crate::DiagnosticConnection;

struct Scripted {
    fragment: String,
    rows: Vec<Row>,
    error: Option<QueryLensError>,
    /// Number of leading calls that fail before `rows` is returned.
    failures_remaining: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryConnection {
    scripts: Vec<Scripted>,
    executed: Mutex<Vec<String>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `fragment` with `rows`.
    pub fn respond(mut self, fragment: impl Into<String>, rows: Vec<Row>) -> Self {
        self.scripts.push(Scripted {
            fragment: fragment.into(),
            rows,
            error: None,
            failures_remaining: AtomicUsize::new(0),
        });
        self
    }

    /// Fail every statement containing `fragment` with `error`.
    pub fn fail(mut self, fragment: impl Into<String>, error: QueryLensError) -> Self {
        self.scripts.push(Scripted {
            fragment: fragment.into(),
            rows: Vec::new(),
            error: Some(error),
            failures_remaining: AtomicUsize::new(usize::MAX),
        });
        self
    }

    /// Fail the first `times` statements containing `fragment`, then answer with `rows`.
    pub fn flaky(
        mut self,
        fragment: impl Into<String>,
        times: usize,
        error: QueryLensError,
        rows: Vec<Row>,
    ) -> Self {
        self.scripts.push(Scripted {
            fragment: fragment.into(),
            rows,
            error: Some(error),
            failures_remaining: AtomicUsize::new(times),
        });
        self
    }

    /// Every statement received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// How many received statements contained `fragment`.
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.executed()
            .iter()
            .filter(|sql| sql.contains(fragment))
            .count()
    }
}

#[async_trait]
impl DiagnosticConnection for MemoryConnection {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        if let Ok(mut log) = self.executed.lock() {
            log.push(sql.to_string());
        }

        let script = self
            .scripts
            .iter()
            .find(|s| sql.contains(&s.fragment))
            .ok_or_else(|| {
                QueryLensError::query_failed(format!("No scripted response for: {}", sql))
            })?;

        if let Some(error) = &script.error {
            let failing = script
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(error.clone());
            }
        }

        Ok(script.rows.clone())
    }
}
