use querylens_common::anonymizer::{anonymize, anonymize_in_place};
use serde::Deserialize;

use super::{average, positive_count, push_opt, FromRow, ToAttributes};

/// Column layout of the slow-query diagnostic query.
#[derive(Debug, Deserialize)]
pub struct SlowQueryRow {
    pub query_id: String,
    pub query_text: Option<String>,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub statement_type: Option<String>,
    pub last_execution_timestamp: Option<String>,
    pub execution_count: i64,
    pub total_elapsed_time_ms: f64,
    pub total_cpu_time_ms: Option<f64>,
    pub total_logical_reads: Option<f64>,
    pub total_logical_writes: Option<f64>,
}

/// A statement ranked by its average elapsed time.
#[derive(Debug, Clone, PartialEq)]
pub struct SlowQueryRecord {
    /// Hex query hash; correlation key for the execution-plan fetch.
    pub query_id: String,
    pub query_text: Option<String>,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub statement_type: Option<String>,
    pub last_execution_timestamp: Option<String>,
    pub execution_count: u64,
    pub total_elapsed_time_ms: f64,
    pub avg_elapsed_time_ms: f64,
    pub avg_cpu_time_ms: Option<f64>,
    pub avg_disk_reads: Option<f64>,
    pub avg_disk_writes: Option<f64>,
}

impl FromRow for SlowQueryRecord {
    type Raw = SlowQueryRow;

    fn from_raw(raw: SlowQueryRow) -> Result<Self, String> {
        let execution_count = positive_count("execution_count", raw.execution_count)?;
        if raw.query_id.trim().is_empty() {
            return Err("query_id is empty".to_string());
        }

        let statement_type = raw
            .statement_type
            .or_else(|| raw.query_text.as_deref().and_then(infer_statement_type));

        Ok(Self {
            query_id: raw.query_id,
            query_text: raw.query_text,
            database_name: raw.database_name,
            schema_name: raw.schema_name,
            statement_type,
            last_execution_timestamp: raw.last_execution_timestamp,
            execution_count,
            total_elapsed_time_ms: raw.total_elapsed_time_ms,
            avg_elapsed_time_ms: raw.total_elapsed_time_ms / execution_count as f64,
            avg_cpu_time_ms: average(raw.total_cpu_time_ms, execution_count),
            avg_disk_reads: average(raw.total_logical_reads, execution_count),
            avg_disk_writes: average(raw.total_logical_writes, execution_count),
        })
    }

    fn anonymize(&mut self) {
        anonymize_in_place(&mut self.query_text);
    }
}

impl ToAttributes for SlowQueryRecord {
    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![("query_id", self.query_id.clone())];
        push_opt(&mut attrs, "query_text", &self.query_text);
        push_opt(&mut attrs, "database_name", &self.database_name);
        push_opt(&mut attrs, "schema_name", &self.schema_name);
        push_opt(&mut attrs, "statement_type", &self.statement_type);
        push_opt(
            &mut attrs,
            "last_execution_timestamp",
            &self.last_execution_timestamp,
        );
        attrs.push(("execution_count", self.execution_count.to_string()));
        attrs.push(("avg_elapsed_time_ms", self.avg_elapsed_time_ms.to_string()));
        push_opt(&mut attrs, "avg_cpu_time_ms", &self.avg_cpu_time_ms);
        push_opt(&mut attrs, "avg_disk_reads", &self.avg_disk_reads);
        push_opt(&mut attrs, "avg_disk_writes", &self.avg_disk_writes);
        attrs
    }
}

/// Leading keyword of a statement (`SELECT`, `UPDATE`, ...). After a `WITH` CTE
/// list, the first keyword outside any parentheses wins.
fn infer_statement_type(text: &str) -> Option<String> {
    let normalized = anonymize(text)
        .to_uppercase()
        .replace('(', " ( ")
        .replace(')', " ) ");

    let mut depth = 0usize;
    let mut after_with = false;
    for token in normalized.split_whitespace() {
        match token {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            _ => {
                let word = token.trim_matches(|c: char| !c.is_ascii_alphanumeric());
                if word.is_empty() {
                    continue;
                }
                if !after_with {
                    if word != "WITH" {
                        return statement_keyword(word);
                    }
                    after_with = true;
                } else if depth == 0 {
                    if let Some(keyword) = statement_keyword(word) {
                        return Some(keyword);
                    }
                }
            }
        }
    }
    None
}

fn statement_keyword(word: &str) -> Option<String> {
    match word {
        "SELECT" | "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "EXEC" => Some(word.to_string()),
        "EXECUTE" => Some("EXEC".to_string()),
        _ => None,
    }
}
