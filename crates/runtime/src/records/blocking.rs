use querylens_common::anonymizer::anonymize_in_place;
use serde::Deserialize;

use super::{push_opt, FromRow, ToAttributes};

#[derive(Debug, Deserialize)]
pub struct BlockingRow {
    pub blocking_spid: i64,
    pub blocked_spid: i64,
    pub blocking_status: Option<String>,
    pub blocked_status: Option<String>,
    pub wait_type: Option<String>,
    pub wait_time_ms: f64,
    pub command_type: Option<String>,
    pub database_name: Option<String>,
    pub blocking_query_text: Option<String>,
    pub blocked_query_text: Option<String>,
}

/// A session waiting on a lock held by another session.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingPairRecord {
    pub blocking_spid: i64,
    pub blocked_spid: i64,
    pub blocking_status: Option<String>,
    pub blocked_status: Option<String>,
    pub wait_type: Option<String>,
    pub wait_time_ms: f64,
    pub command_type: Option<String>,
    pub database_name: Option<String>,
    pub blocking_query_text: Option<String>,
    pub blocked_query_text: Option<String>,
}

impl FromRow for BlockingPairRecord {
    type Raw = BlockingRow;

    fn from_raw(raw: BlockingRow) -> Result<Self, String> {
        if raw.blocking_spid == raw.blocked_spid {
            return Err(format!("session {} cannot block itself", raw.blocked_spid));
        }

        Ok(Self {
            blocking_spid: raw.blocking_spid,
            blocked_spid: raw.blocked_spid,
            blocking_status: raw.blocking_status,
            blocked_status: raw.blocked_status,
            wait_type: raw.wait_type,
            wait_time_ms: raw.wait_time_ms,
            command_type: raw.command_type,
            database_name: raw.database_name,
            blocking_query_text: raw.blocking_query_text,
            blocked_query_text: raw.blocked_query_text,
        })
    }

    fn anonymize(&mut self) {
        anonymize_in_place(&mut self.blocking_query_text);
        anonymize_in_place(&mut self.blocked_query_text);
    }
}

impl ToAttributes for BlockingPairRecord {
    fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("blocking_spid", self.blocking_spid.to_string()),
            ("blocked_spid", self.blocked_spid.to_string()),
        ];
        push_opt(&mut attrs, "blocking_status", &self.blocking_status);
        push_opt(&mut attrs, "blocked_status", &self.blocked_status);
        push_opt(&mut attrs, "wait_type", &self.wait_type);
        attrs.push(("wait_time_ms", self.wait_time_ms.to_string()));
        push_opt(&mut attrs, "command_type", &self.command_type);
        push_opt(&mut attrs, "database_name", &self.database_name);
        push_opt(&mut attrs, "blocking_query_text", &self.blocking_query_text);
        push_opt(&mut attrs, "blocked_query_text", &self.blocked_query_text);
        attrs
    }
}
