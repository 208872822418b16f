#![allow(dead_code)]

use querylens_common::config::AppConfig;
use querylens_common::models::Row;
use querylens_connectors::MemoryConnection;
use querylens_runtime::ingest::{MetricSet, MetricSink, SinkError};
use querylens_runtime::queries::QueryDefinition;

/// Keeps every delivered batch; optionally rejects deliveries for one event type.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Vec<Vec<MetricSet>>,
    pub reject_event_type: Option<String>,
}

impl RecordingSink {
    pub fn sets(&self, event_type: &str) -> Vec<&MetricSet> {
        self.batches
            .iter()
            .flatten()
            .filter(|s| s.event_type == event_type)
            .collect()
    }

    pub fn total(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

impl MetricSink for RecordingSink {
    fn publish(&mut self, batch: &[MetricSet]) -> Result<(), SinkError> {
        if let (Some(rejected), Some(first)) = (&self.reject_event_type, batch.first()) {
            if &first.event_type == rejected {
                return Err(SinkError::Rejected(format!("{} is disabled", rejected)));
            }
        }
        self.batches.push(batch.to_vec());
        Ok(())
    }
}

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.probe.record_count_threshold = 2;
    config.probe.response_time_threshold_ms = 10.0;
    config.probe.batch_size = 2;
    config
}

pub fn definition(name: &str, category: &str, event_type: &str, query: &str) -> QueryDefinition {
    QueryDefinition {
        name: name.to_string(),
        category: category.to_string(),
        event_type: event_type.to_string(),
        query: query.to_string(),
        plan_query: None,
        plan_event_type: "MssqlQueryExecutionPlans".to_string(),
    }
}

/// Connection that passes every precondition check.
pub fn admitted_connection() -> MemoryConnection {
    MemoryConnection::new()
        .respond(
            "ProductVersion",
            vec![Row::new().with("product_version", "16.0.4135.4")],
        )
        .respond(
            "sys.databases",
            vec![Row::new()
                .with("database_name", "sales")
                .with("compatibility_level", 160)
                .with("is_query_store_on", true)],
        )
        .respond(
            "VIEW SERVER STATE",
            vec![Row::new().with("has_permission", 1)],
        )
        .respond(
            "IsIntegratedSecurityOnly",
            vec![Row::new().with("integrated_security_only", 0)],
        )
}

pub fn slow_query(id: &str, executions: i64, total_ms: f64) -> Row {
    Row::new()
        .with("query_id", id)
        .with("query_text", format!("SELECT * FROM orders WHERE id = {}", executions))
        .with("database_name", "sales")
        .with("execution_count", executions)
        .with("total_elapsed_time_ms", total_ms)
}

pub fn wait_event(id: &str, category: &str, total_ms: f64, count: i64) -> Row {
    Row::new()
        .with("query_id", id)
        .with("query_text", "UPDATE stock SET qty = 0 WHERE sku = 'X1'")
        .with("wait_category", category)
        .with("total_wait_time_ms", total_ms)
        .with("wait_event_count", count)
}
