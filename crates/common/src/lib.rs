//! Common utilities, types, and configuration shared across querylens crates.
//!
//! - **Configuration**: Strongly typed probe configuration (`config`).
//! - **Rows**: Driver-independent raw result rows (`models`).
//! - **Resilience**: Bounded retry without backoff (`retry`).
//! - **Privacy**: Literal anonymization of captured query text (`anonymizer`).
//! - **Telemetry**: Logging and OTLP tracing setup (`telemetry`).
pub mod anonymizer;
pub mod config;
pub mod models;
pub mod retry;
pub mod telemetry;
