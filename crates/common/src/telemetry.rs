//! Logging and tracing initialization for the probe.
//!
//! Log lines go to stderr because stdout carries the metric payload. When the
//! `telemetry` feature is enabled and configured, spans are additionally exported
//! over OTLP/gRPC to a collector.

use anyhow::Result;

#[cfg(feature = "telemetry")]
use {
    opentelemetry::trace::TracerProvider, opentelemetry::KeyValue,
    opentelemetry_otlp::WithExportConfig,
    opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider, opentelemetry_sdk::Resource,
    tracing_opentelemetry::OpenTelemetryLayer,
};

use crate::config::TelemetryConfig;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build the OTLP export layer, or a no-op layer when the feature is compiled out.
pub fn init_telemetry<S>(
    service_name: &str,
    endpoint: &str,
) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    #[cfg(feature = "telemetry")]
    {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.to_string(),
            )]))
            .build();

        let tracer = provider.tracer(service_name.to_string());
        opentelemetry::global::set_tracer_provider(provider);

        Ok(Box::new(OpenTelemetryLayer::new(tracer)))
    }
    #[cfg(not(feature = "telemetry"))]
    {
        if !endpoint.is_empty() {
            tracing::debug!(
                service = service_name,
                "OTLP export requested but the telemetry feature is not compiled in"
            );
        }
        Ok(Box::new(tracing_subscriber::layer::Identity::new()))
    }
}

/// Install the global subscriber: env filter, stderr formatter, optional OTLP layer.
///
/// `RUST_LOG` takes precedence over `config.log_filter`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;

    let otel_layer = if config.enabled {
        init_telemetry(&config.service_name, &config.endpoint)?
    } else {
        Box::new(tracing_subscriber::layer::Identity::new())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

pub fn shutdown_telemetry() {
    #[cfg(feature = "telemetry")]
    opentelemetry::global::shutdown_tracer_provider();
}
