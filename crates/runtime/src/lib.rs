//! querylens runtime: the query-performance analysis pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────┐   ┌───────────┐   ┌────────────┐
//! │ Precondition │──▶│  Execute   │──▶│   Bind    │──▶│  Top-K    │──▶│  Batched   │
//! │  Validator   │   │ (retried)  │   │ (registry)│   │ selection │   │ ingestion  │
//! └──────────────┘   └────────────┘   └───────────┘   └─────┬─────┘   └────────────┘
//!                                                           │ query ids
//!                                                     ┌─────▼─────┐
//!                                                     │ plan fetch│
//!                                                     └───────────┘
//! ```
//!
//! [`analysis::QueryAnalyzer`] drives one cycle; everything else is usable on
//! its own.

pub mod analysis;
pub mod binder;
pub mod exit_codes;
pub mod ingest;
pub mod queries;
pub mod records;
pub mod selection;
pub mod validation;
