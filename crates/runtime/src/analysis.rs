//! One analysis cycle over the configured query definitions.
//!
//! ```text
//! Idle -> Validating -(rejected)-> Idle
//!            |
//!            v
//!   for each definition:
//!     Executing -> Binding -> [slow_query: Selecting -> CorrelatedFetch] -> Ingesting
//! ```
//!
//! Validation runs once, before any definition. A failure inside one definition
//! is logged and recorded in the [`CycleReport`]; the next definition still runs.
//! Rejection by the validator and lost connectivity end the cycle.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, info_span, warn, Instrument};

use querylens_common::config::{AppConfig, ProbeSettings, RetrySettings};
use querylens_common::models::Row;
use querylens_common::retry::retry_async;
use querylens_connectors::DiagnosticConnection;
use querylens_error::{ErrorCode, ErrorContext, QueryLensError, Result};

use crate::binder::{default_registry, BinderRegistry};
use crate::ingest::{ingest_in_batches, MetricSink};
use crate::queries::{substitute_query_ids, QueryDefinition, QueryParameters};
use crate::records::{bind_row, ExecutionPlanRecord, Record};
use crate::selection::{SelectionCriteria, TopK};
use crate::validation::{PreconditionValidator, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Validating,
    Executing,
    Binding,
    Selecting,
    CorrelatedFetch,
    Ingesting,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Validating => "validating",
            CyclePhase::Executing => "executing",
            CyclePhase::Binding => "binding",
            CyclePhase::Selecting => "selecting",
            CyclePhase::CorrelatedFetch => "correlated_fetch",
            CyclePhase::Ingesting => "ingesting",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum DefinitionOutcome {
    Completed {
        rows: usize,
        bound: usize,
        skipped: usize,
        ingested: usize,
        plans_ingested: usize,
    },
    Failed {
        phase: CyclePhase,
        error: QueryLensError,
    },
}

#[derive(Debug)]
pub struct DefinitionReport {
    pub name: String,
    pub outcome: DefinitionOutcome,
}

impl DefinitionReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, DefinitionOutcome::Completed { .. })
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match &self.outcome {
            DefinitionOutcome::Failed { error, .. } => Some(error.code),
            DefinitionOutcome::Completed { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct CycleReport {
    /// RFC 3339 UTC timestamp stamped on every metric set of the cycle.
    pub collection_timestamp: String,
    pub validation: ValidationReport,
    pub definitions: Vec<DefinitionReport>,
}

impl CycleReport {
    pub fn definition(&self, name: &str) -> Option<&DefinitionReport> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn failed(&self) -> usize {
        self.definitions.iter().filter(|d| !d.is_completed()).count()
    }

    /// Metric sets delivered, plans included.
    pub fn total_ingested(&self) -> usize {
        self.definitions
            .iter()
            .map(|d| match d.outcome {
                DefinitionOutcome::Completed {
                    ingested,
                    plans_ingested,
                    ..
                } => ingested + plans_ingested,
                DefinitionOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

type PhaseResult<T> = std::result::Result<T, (CyclePhase, QueryLensError)>;

fn at(phase: CyclePhase) -> impl FnOnce(QueryLensError) -> (CyclePhase, QueryLensError) {
    move |e| (phase, e)
}

pub struct QueryAnalyzer {
    connection: Arc<dyn DiagnosticConnection>,
    settings: ProbeSettings,
    retry: RetrySettings,
    definitions: Vec<QueryDefinition>,
    registry: BinderRegistry,
    validator: PreconditionValidator,
}

impl QueryAnalyzer {
    pub fn new(
        connection: Arc<dyn DiagnosticConnection>,
        config: &AppConfig,
        definitions: Vec<QueryDefinition>,
    ) -> Self {
        let validator = PreconditionValidator::new(
            config.probe.supported_versions.clone(),
            config.probe.legacy_mode,
        );
        Self {
            connection,
            settings: config.probe.clone(),
            retry: config.retry,
            definitions,
            registry: default_registry(),
            validator,
        }
    }

    /// Replace the binder registry, e.g. to add a category.
    pub fn with_registry(mut self, registry: BinderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub async fn run_cycle(&self, sink: &mut dyn MetricSink) -> Result<CycleReport> {
        let span = info_span!(
            "analysis_cycle",
            connection = self.connection.kind(),
            definitions = self.definitions.len()
        );
        self.run_cycle_inner(sink).instrument(span).await
    }

    async fn run_cycle_inner(&self, sink: &mut dyn MetricSink) -> Result<CycleReport> {
        let collection_timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        debug!(phase = %CyclePhase::Validating);
        let validation = match self.validator.check(Arc::clone(&self.connection)).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    error = %e,
                    phase = %CyclePhase::Idle,
                    "Environment rejected, skipping cycle"
                );
                return Err(e);
            }
        };

        let params = QueryParameters::from(&self.settings);
        let mut definitions = Vec::with_capacity(self.definitions.len());

        for def in &self.definitions {
            let span = info_span!(
                "query_definition",
                name = %def.name,
                category = %def.category,
                event_type = %def.event_type
            );
            let outcome = match self
                .run_definition(def, &params, &mut *sink, &collection_timestamp)
                .instrument(span)
                .await
            {
                Ok(outcome) => outcome,
                Err((phase, error)) if error.is_cycle_fatal() => {
                    warn!(definition = %def.name, %phase, error = %error, "Aborting cycle");
                    return Err(error);
                }
                Err((phase, error)) => {
                    warn!(
                        definition = %def.name,
                        %phase,
                        error = %error,
                        "Query definition failed"
                    );
                    DefinitionOutcome::Failed { phase, error }
                }
            };
            definitions.push(DefinitionReport {
                name: def.name.clone(),
                outcome,
            });
        }

        let report = CycleReport {
            collection_timestamp,
            validation,
            definitions,
        };
        info!(
            failed = report.failed(),
            ingested = report.total_ingested(),
            "Analysis cycle finished"
        );
        Ok(report)
    }

    async fn run_definition(
        &self,
        def: &QueryDefinition,
        params: &QueryParameters,
        sink: &mut dyn MetricSink,
        collection_timestamp: &str,
    ) -> PhaseResult<DefinitionOutcome> {
        // Resolved once for the whole result set.
        let binder = self
            .registry
            .binder_for(&def.name, &def.category)
            .map_err(at(CyclePhase::Binding))?;

        let rows = self
            .execute(&def.name, &params.substitute(&def.query))
            .await
            .map_err(at(CyclePhase::Executing))?;
        let row_count = rows.len();

        let bound = self.registry.bind_rows(binder, rows);
        let (bound_count, skipped) = (bound.records.len(), bound.skipped);
        debug!(
            rows = row_count,
            bound = bound_count,
            skipped,
            correlation_keys = bound.correlation_keys.len(),
            "Bound result set"
        );

        let mut plans = Vec::new();
        let records = if binder.category().is_ranked() {
            let criteria = SelectionCriteria::new(
                self.settings.response_time_threshold_ms,
                self.settings.record_count_threshold,
            );
            let strategy = self.settings.selection_strategy;
            let selected = strategy.select(bound.records, criteria);
            debug!(
                strategy = strategy.name(),
                candidates = bound_count,
                selected = selected.len(),
                "Selected slow queries"
            );

            if let Some(template) = &def.plan_query {
                plans = self
                    .fetch_plans(def, template, params, &bound.correlation_keys, &selected)
                    .await;
            }
            selected
        } else {
            bound.records
        };

        let ingested = ingest_in_batches(
            &mut *sink,
            &def.event_type,
            &records,
            self.settings.batch_size,
            collection_timestamp,
        )
        .map_err(at(CyclePhase::Ingesting))?;

        let plans_ingested = ingest_in_batches(
            sink,
            &def.plan_event_type,
            &plans,
            self.settings.batch_size,
            collection_timestamp,
        )
        .map_err(at(CyclePhase::Ingesting))?;

        Ok(DefinitionOutcome::Completed {
            rows: row_count,
            bound: bound_count,
            skipped,
            ingested,
            plans_ingested,
        })
    }

    /// Look up execution plans for the bound correlation keys that survived
    /// selection. Failures are logged and yield no plans; the slow queries
    /// themselves are unaffected.
    async fn fetch_plans(
        &self,
        def: &QueryDefinition,
        template: &str,
        params: &QueryParameters,
        correlation_keys: &[String],
        selected: &[Record],
    ) -> Vec<ExecutionPlanRecord> {
        let survivors: HashSet<&str> = selected
            .iter()
            .filter_map(Record::correlation_key)
            .collect();
        let keys: Vec<String> = correlation_keys
            .iter()
            .filter(|key| survivors.contains(key.as_str()))
            .cloned()
            .collect();
        let Some(sql) = substitute_query_ids(&params.substitute(template), &keys) else {
            debug!(phase = %CyclePhase::CorrelatedFetch, "No query ids to look up plans for");
            return Vec::new();
        };

        let operation = format!("{}.plans", def.name);
        let rows = match self.execute(&operation, &sql).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    phase = %CyclePhase::CorrelatedFetch,
                    error = %e,
                    "Execution plan lookup failed"
                );
                return Vec::new();
            }
        };

        rows.into_iter()
            .enumerate()
            .filter_map(|(row_index, row)| {
                match bind_row::<ExecutionPlanRecord>(row, "execution_plan", row_index) {
                    Ok(plan) => Some(plan),
                    Err(e) => {
                        warn!(row_index, error = %e, "Skipping execution plan row");
                        None
                    }
                }
            })
            .collect()
    }

    /// Run one statement under the retry budget.
    async fn execute(&self, operation: &str, sql: &str) -> Result<Vec<Row>> {
        let connection = Arc::clone(&self.connection);
        let attempts = self.retry.max_attempts.max(1);

        retry_async(operation, self.retry, move || {
            let connection = Arc::clone(&connection);
            async move { connection.query(sql).await }
        })
        .await
        .map_err(|e| {
            if e.code == ErrorCode::ConnectivityError {
                return e;
            }
            QueryLensError::new(
                ErrorCode::RetryExhausted,
                format!("'{}' failed after {} attempts: {}", operation, attempts, e.message),
            )
            .with_context(ErrorContext::Retry {
                operation: operation.to_string(),
                attempts,
            })
        })
    }
}
