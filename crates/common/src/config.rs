use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Default constants
pub const DEFAULT_CONFIG_PATH: &str = "config/querylens.yaml";
pub const DEFAULT_ENV_PREFIX: &str = "QUERYLENS";

pub const DEFAULT_FETCH_INTERVAL_SECONDS: u64 = 15;
pub const DEFAULT_RECORD_COUNT_THRESHOLD: i64 = 20;
pub const DEFAULT_RESPONSE_TIME_THRESHOLD_MS: f64 = 500.0;
pub const DEFAULT_TEXT_TRUNCATE_LIMIT: u32 = 4094;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_SUPPORTED_VERSIONS: [u32; 3] = [14, 15, 16];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_TELEMETRY_ENABLED: bool = false;
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
pub const DEFAULT_SERVICE_NAME: &str = "querylens";
pub const DEFAULT_LOG_FILTER: &str = "info";

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()).map(SecretString::from))
}

/// Top-level probe configuration.
///
/// Loaded from an optional YAML file, then overridden by `QUERYLENS__SECTION__FIELD`
/// environment variables.
#[derive(Debug, Deserialize, Default, Clone, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    #[validate(nested)]
    pub probe: ProbeSettings,
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetrySettings,
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ConnectionSettings {
    /// ADO.NET style connection string. Never logged.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub connection_string: Option<SecretString>,

    #[serde(default = "default_connect_timeout_secs")]
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_string: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Knobs of the query-performance analysis cycle.
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ProbeSettings {
    /// Lookback window substituted into the diagnostic queries.
    #[serde(default = "default_fetch_interval_seconds")]
    #[validate(range(min = 1))]
    pub fetch_interval_seconds: u64,

    /// Top-K limit for slow queries. Zero or negative means unlimited.
    #[serde(default = "default_record_count_threshold")]
    pub record_count_threshold: i64,

    /// Inclusive minimum average elapsed time for a slow query to be reported.
    #[serde(default = "default_response_time_threshold_ms")]
    #[validate(range(min = 0.0))]
    pub response_time_threshold_ms: f64,

    #[serde(default = "default_text_truncate_limit")]
    #[validate(range(min = 1))]
    pub text_truncate_limit: u32,

    /// Maximum metric sets per delivery to the sink.
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Judge databases by compatibility level instead of Query Store state.
    #[serde(default)]
    pub legacy_mode: bool,

    #[serde(default)]
    pub selection_strategy: SelectionStrategy,

    #[serde(default = "default_supported_versions")]
    #[validate(length(min = 1))]
    pub supported_versions: Vec<u32>,

    /// Optional YAML file replacing the built-in query definitions.
    #[serde(default)]
    pub queries_file: Option<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            fetch_interval_seconds: default_fetch_interval_seconds(),
            record_count_threshold: default_record_count_threshold(),
            response_time_threshold_ms: default_response_time_threshold_ms(),
            text_truncate_limit: default_text_truncate_limit(),
            batch_size: default_batch_size(),
            legacy_mode: false,
            selection_strategy: SelectionStrategy::default(),
            supported_versions: default_supported_versions(),
            queries_file: None,
        }
    }
}

/// Top-K selection algorithm used for the slow-query category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    FullSort,
    #[default]
    BoundedHeap,
    #[serde(alias = "quickselect")]
    QuickSelect,
    PartialSort,
}

#[derive(Debug, Deserialize, Clone, Copy, Validate)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1))]
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_otlp_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
            log_filter: default_log_filter(),
        }
    }
}

fn default_fetch_interval_seconds() -> u64 {
    DEFAULT_FETCH_INTERVAL_SECONDS
}

fn default_record_count_threshold() -> i64 {
    DEFAULT_RECORD_COUNT_THRESHOLD
}

fn default_response_time_threshold_ms() -> f64 {
    DEFAULT_RESPONSE_TIME_THRESHOLD_MS
}

fn default_text_truncate_limit() -> u32 {
    DEFAULT_TEXT_TRUNCATE_LIMIT
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_supported_versions() -> Vec<u32> {
    DEFAULT_SUPPORTED_VERSIONS.to_vec()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_telemetry_enabled() -> bool {
    DEFAULT_TELEMETRY_ENABLED
}

fn default_otlp_endpoint() -> String {
    DEFAULT_OTLP_ENDPOINT.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        // QUERYLENS__PROBE__RECORD_COUNT_THRESHOLD -> probe.record_count_threshold
        let builder = builder.add_source(
            config::Environment::with_prefix(DEFAULT_ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {:?}", e))?;

        Ok(app_config)
    }
}
