use querylens_common::anonymizer::anonymize_in_place;
use serde::Deserialize;

use super::{average, positive_count, push_opt, FromRow, ToAttributes};

#[derive(Debug, Deserialize)]
pub struct ExecutionPlanRow {
    pub query_id: String,
    pub plan_handle: Option<String>,
    pub query_plan_id: Option<String>,
    pub sql_text: Option<String>,
    pub execution_count: i64,
    pub total_cpu_ms: Option<f64>,
    pub total_elapsed_ms: Option<f64>,
    pub last_execution_timestamp: Option<String>,
}

/// Cached plan statistics for a query selected as slow.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlanRecord {
    pub query_id: String,
    pub plan_handle: Option<String>,
    pub query_plan_id: Option<String>,
    pub sql_text: Option<String>,
    pub execution_count: u64,
    pub total_cpu_ms: Option<f64>,
    pub total_elapsed_ms: Option<f64>,
    pub avg_elapsed_ms: Option<f64>,
    pub last_execution_timestamp: Option<String>,
}

impl FromRow for ExecutionPlanRecord {
    type Raw = ExecutionPlanRow;

    fn from_raw(raw: ExecutionPlanRow) -> Result<Self, String> {
        let execution_count = positive_count("execution_count", raw.execution_count)?;
        Ok(Self {
            query_id: raw.query_id,
            plan_handle: raw.plan_handle,
            query_plan_id: raw.query_plan_id,
            sql_text: raw.sql_text,
            execution_count,
            total_cpu_ms: raw.total_cpu_ms,
            total_elapsed_ms: raw.total_elapsed_ms,
            avg_elapsed_ms: average(raw.total_elapsed_ms, execution_count),
            last_execution_timestamp: raw.last_execution_timestamp,
        })
    }

    fn anonymize(&mut self) {
        anonymize_in_place(&mut self.sql_text);
    }
}

impl ToAttributes for ExecutionPlanRecord {
    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![("query_id", self.query_id.clone())];
        push_opt(&mut attrs, "plan_handle", &self.plan_handle);
        push_opt(&mut attrs, "query_plan_id", &self.query_plan_id);
        push_opt(&mut attrs, "sql_text", &self.sql_text);
        attrs.push(("execution_count", self.execution_count.to_string()));
        push_opt(&mut attrs, "total_cpu_ms", &self.total_cpu_ms);
        push_opt(&mut attrs, "total_elapsed_ms", &self.total_elapsed_ms);
        push_opt(&mut attrs, "avg_elapsed_ms", &self.avg_elapsed_ms);
        push_opt(
            &mut attrs,
            "last_execution_timestamp",
            &self.last_execution_timestamp,
        );
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::bind_row;
    use querylens_common::models::Row;

    #[test]
    fn test_plan_record_binding() {
        let row = Row::new()
            .with("query_id", "0xAB")
            .with("plan_handle", "0x0600")
            .with("sql_text", "SELECT TOP 10 * FROM t WHERE a > 3")
            .with("execution_count", 2)
            .with("total_elapsed_ms", 8.0);

        let record: ExecutionPlanRecord = bind_row(row, "execution_plan", 0).unwrap();
        assert_eq!(record.avg_elapsed_ms, Some(4.0));
        assert_eq!(record.total_cpu_ms, None);
        assert_eq!(
            record.sql_text.as_deref(),
            Some("SELECT TOP ? * FROM t WHERE a > ?")
        );
    }
}
