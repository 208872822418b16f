use querylens_common::anonymizer::anonymize_in_place;
use serde::Deserialize;

use super::{positive_count, push_opt, FromRow, ToAttributes};

#[derive(Debug, Deserialize)]
pub struct WaitEventRow {
    pub query_id: Option<String>,
    pub query_text: Option<String>,
    pub database_name: Option<String>,
    pub wait_category: String,
    pub total_wait_time_ms: f64,
    pub wait_event_count: i64,
    pub last_execution_timestamp: Option<String>,
}

/// Wait time accumulated by one query in one wait category.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitEventRecord {
    pub query_id: Option<String>,
    pub query_text: Option<String>,
    pub database_name: Option<String>,
    pub wait_category: String,
    pub total_wait_time_ms: f64,
    pub wait_event_count: u64,
    pub avg_wait_time_ms: f64,
    pub last_execution_timestamp: Option<String>,
}

impl FromRow for WaitEventRecord {
    type Raw = WaitEventRow;

    fn from_raw(raw: WaitEventRow) -> Result<Self, String> {
        let wait_event_count = positive_count("wait_event_count", raw.wait_event_count)?;
        if raw.total_wait_time_ms < 0.0 {
            return Err(format!(
                "total_wait_time_ms must not be negative, got {}",
                raw.total_wait_time_ms
            ));
        }

        Ok(Self {
            query_id: raw.query_id.filter(|id| !id.trim().is_empty()),
            query_text: raw.query_text,
            database_name: raw.database_name,
            wait_category: raw.wait_category,
            total_wait_time_ms: raw.total_wait_time_ms,
            wait_event_count,
            avg_wait_time_ms: raw.total_wait_time_ms / wait_event_count as f64,
            last_execution_timestamp: raw.last_execution_timestamp,
        })
    }

    fn anonymize(&mut self) {
        anonymize_in_place(&mut self.query_text);
    }
}

impl ToAttributes for WaitEventRecord {
    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::with_capacity(8);
        push_opt(&mut attrs, "query_id", &self.query_id);
        push_opt(&mut attrs, "query_text", &self.query_text);
        push_opt(&mut attrs, "database_name", &self.database_name);
        attrs.push(("wait_category", self.wait_category.clone()));
        attrs.push(("total_wait_time_ms", self.total_wait_time_ms.to_string()));
        attrs.push(("wait_event_count", self.wait_event_count.to_string()));
        attrs.push(("avg_wait_time_ms", self.avg_wait_time_ms.to_string()));
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

    fn row() -> Row {
        Row::new()
            .with("query_id", "0x01")
            .with("query_text", "UPDATE stock SET qty = qty - 1 WHERE sku = N'A-17'")
            .with("wait_category", "Lock")
            .with("total_wait_time_ms", 90.0)
            .with("wait_event_count", 3)
    }

    #[test]
    fn test_binds_wait_event() {
        let record: WaitEventRecord = bind_row(row(), "wait_event", 0).unwrap();
        assert_eq!(record.avg_wait_time_ms, 30.0);
        assert_eq!(
            record.query_text.as_deref(),
            Some("UPDATE stock SET qty = qty - ? WHERE sku = ?")
        );
    }

    #[test]
    fn test_blank_query_id_treated_as_missing() {
        let record: WaitEventRecord =
            bind_row(row().with("query_id", "  "), "wait_event", 0).unwrap();
        assert!(record.query_id.is_none());
    }

    #[test]
    fn test_zero_wait_count_rejected() {
        assert!(
            bind_row::<WaitEventRecord>(row().with("wait_event_count", 0), "wait_event", 1).is_err()
        );
    }
}
