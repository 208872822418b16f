//! Diagnostic query definitions and placeholder substitution.
//!
//! Query text is opaque to the pipeline. A definition only declares which record
//! category its rows bind into and under which event type they are reported.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use querylens_common::config::ProbeSettings;
use querylens_error::{ErrorCode, ErrorContext, QueryLensError, Result};

use crate::records::RecordCategory;

const DEFAULT_QUERIES: &str = include_str!("../queries/default.yaml");

pub const DEFAULT_PLAN_EVENT_TYPE: &str = "MssqlQueryExecutionPlans";

/// Substituted for `{record_limit}` when the record count threshold is unlimited.
pub const UNLIMITED_RECORD_LIMIT: i64 = i32::MAX as i64;

static QUERY_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0[xX][0-9A-Fa-f]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryDefinition {
    pub name: String,
    /// Record category identifier, resolved against the binder registry at run time.
    pub category: String,
    pub event_type: String,
    pub query: String,
    /// Follow-up lookup keyed by the selected slow queries' `{query_ids}`.
    #[serde(default)]
    pub plan_query: Option<String>,
    #[serde(default = "default_plan_event_type")]
    pub plan_event_type: String,
}

fn default_plan_event_type() -> String {
    DEFAULT_PLAN_EVENT_TYPE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySet {
    pub queries: Vec<QueryDefinition>,
}

impl QuerySet {
    /// Load definitions from `path`, or the built-in set when no path is given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    QueryLensError::new(
                        ErrorCode::InvalidConfig,
                        format!("Cannot read query definitions '{}': {}", path, e),
                    )
                    .with_context(ErrorContext::Config {
                        file_path: Some(path.to_string()),
                        field: Some("probe.queries_file".to_string()),
                    })
                })?;
                Self::parse(&text).map_err(|e| {
                    let field = match &e.context {
                        Some(ErrorContext::Config { field, .. }) => field.clone(),
                        _ => None,
                    };
                    e.with_context(ErrorContext::Config {
                        file_path: Some(path.to_string()),
                        field,
                    })
                })
            }
            None => Self::builtin(),
        }
    }

    pub fn builtin() -> Result<Self> {
        Self::parse(DEFAULT_QUERIES)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let set: QuerySet = serde_yaml::from_str(yaml)?;
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |name: &str, field: &str, message: String| {
            QueryLensError::new(ErrorCode::InvalidQueryDefinition, message).with_context(
                ErrorContext::Config {
                    file_path: None,
                    field: Some(format!("{}.{}", name, field)),
                },
            )
        };

        if self.queries.is_empty() {
            return Err(QueryLensError::new(
                ErrorCode::InvalidQueryDefinition,
                "No query definitions",
            ));
        }

        let mut seen = HashSet::new();
        for def in &self.queries {
            if def.name.trim().is_empty() {
                return Err(invalid("<unnamed>", "name", "Query definition without a name".into()));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(invalid(
                    &def.name,
                    "name",
                    format!("Duplicate query definition '{}'", def.name),
                ));
            }
            if def.query.trim().is_empty() {
                return Err(invalid(
                    &def.name,
                    "query",
                    format!("'{}' has an empty query", def.name),
                ));
            }
            if def.event_type.trim().is_empty() {
                return Err(invalid(
                    &def.name,
                    "event_type",
                    format!("'{}' has no event type", def.name),
                ));
            }
            if let Some(plan_query) = &def.plan_query {
                // Unknown categories are reported when the definition runs.
                if let Ok(category) = def.category.parse::<RecordCategory>() {
                    if !category.is_ranked() {
                        return Err(invalid(
                            &def.name,
                            "plan_query",
                            format!(
                                "'{}' is not a {} definition",
                                def.name,
                                RecordCategory::SlowQuery
                            ),
                        ));
                    }
                }
                if !plan_query.contains("{query_ids}") {
                    return Err(invalid(
                        &def.name,
                        "plan_query",
                        format!("'{}' plan_query does not reference {{query_ids}}", def.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Values substituted into query templates.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    pub interval_seconds: u64,
    pub record_limit: i64,
    pub text_truncate_limit: u32,
    pub response_time_threshold_ms: f64,
}

impl From<&ProbeSettings> for QueryParameters {
    fn from(settings: &ProbeSettings) -> Self {
        let record_limit = if settings.record_count_threshold > 0 {
            settings.record_count_threshold.min(UNLIMITED_RECORD_LIMIT)
        } else {
            UNLIMITED_RECORD_LIMIT
        };

        Self {
            interval_seconds: settings.fetch_interval_seconds,
            record_limit,
            text_truncate_limit: settings.text_truncate_limit,
            response_time_threshold_ms: settings.response_time_threshold_ms,
        }
    }
}

impl QueryParameters {
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{interval_seconds}", &self.interval_seconds.to_string())
            .replace("{record_limit}", &self.record_limit.to_string())
            .replace("{text_truncate_limit}", &self.text_truncate_limit.to_string())
            .replace(
                "{response_time_threshold_ms}",
                &self.response_time_threshold_ms.to_string(),
            )
    }
}

/// Fill `{query_ids}` with the hex keys as T-SQL binary literals.
///
/// Keys that are not hex literals are dropped so nothing but `0x...` reaches the
/// statement. Returns `None` when no usable key remains.
pub fn substitute_query_ids(template: &str, keys: &[String]) -> Option<String> {
    let mut seen = HashSet::new();
    let ids: Vec<&str> = keys
        .iter()
        .map(String::as_str)
        .filter(|key| {
            let valid = QUERY_ID_REGEX.is_match(key);
            if !valid {
                warn!(key, "Dropping malformed query id from plan lookup");
            }
            valid
        })
        .filter(|key| seen.insert(*key))
        .collect();

    if ids.is_empty() {
        return None;
    }
    Some(template.replace("{query_ids}", &ids.join(",")))
}
