//! querylens probe entry point.
//!
//! Runs a single analysis cycle against the configured SQL Server and writes the
//! resulting metric sets to stdout. Scheduling is left to the caller (cron, an
//! agent's integration runner, a Kubernetes CronJob).
use std::sync::Arc;

use querylens_common::config::{AppConfig, DEFAULT_CONFIG_PATH};
use querylens_common::retry::retry_async;
use querylens_connectors::MssqlConnection;
use querylens_runtime::analysis::{CycleReport, QueryAnalyzer};
use querylens_runtime::exit_codes;
use querylens_runtime::ingest::JsonSink;
use querylens_runtime::queries::QuerySet;

/// Overrides the configuration file location.
const CONFIG_PATH_ENV: &str = "QUERYLENS_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match AppConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {:#}", config_path, e);
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    querylens_common::telemetry::init_tracing(&config.telemetry)?;
    tracing::info!(config = %config_path, "Tracing initialized");

    let exit_code = match run(&config).await {
        Ok(report) if report.failed() > 0 => exit_codes::PARTIAL_FAILURE,
        Ok(_) => exit_codes::SUCCESS,
        Err(e) => {
            tracing::error!(code = %e.code, error = %e.to_json(), "Analysis cycle failed");
            exit_codes::for_error(&e)
        }
    };

    querylens_common::telemetry::shutdown_telemetry();

    if exit_code != exit_codes::SUCCESS {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(config: &AppConfig) -> querylens_error::Result<CycleReport> {
    let definitions = QuerySet::load(config.probe.queries_file.as_deref())?.queries;

    let connection = retry_async("connect", config.retry, || {
        MssqlConnection::connect(&config.connection)
    })
    .await?;

    let analyzer = QueryAnalyzer::new(Arc::new(connection), config, definitions);
    let mut sink = JsonSink::stdout();
    analyzer.run_cycle(&mut sink).await
}
