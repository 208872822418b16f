//! Delivery of bound records to the metric sink in bounded batches.

use std::io::{self, Write};
use std::ops::Range;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use querylens_error::{ErrorCode, ErrorContext, QueryLensError, Result};

use crate::records::ToAttributes;

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Attribute(String),
}

impl MetricValue {
    /// Finite numbers are gauges, everything else is an attribute.
    pub fn classify(value: String) -> Self {
        match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => MetricValue::Gauge(n),
            _ => MetricValue::Attribute(value),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MetricValue::Gauge(n) => serializer.serialize_f64(*n),
            MetricValue::Attribute(s) => serializer.serialize_str(s),
        }
    }
}

/// One sample named by the definition's event type.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    pub event_type: String,
    pub metrics: Vec<(String, MetricValue)>,
}

impl MetricSet {
    pub fn from_record<T: ToAttributes + ?Sized>(
        event_type: &str,
        record: &T,
        collection_timestamp: &str,
    ) -> Self {
        let mut metrics: Vec<(String, MetricValue)> = record
            .attributes()
            .into_iter()
            .map(|(key, value)| (key.to_string(), MetricValue::classify(value)))
            .collect();
        metrics.push((
            "collection_timestamp".to_string(),
            MetricValue::Attribute(collection_timestamp.to_string()),
        ));

        Self {
            event_type: event_type.to_string(),
            metrics,
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetricValue> {
        self.metrics.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl Serialize for MetricSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len() + 1))?;
        map.serialize_entry("event_type", &self.event_type)?;
        for (key, value) in &self.metrics {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Rejected by sink: {0}")]
    Rejected(String),
}

/// Destination for metric sets. One call per batch.
pub trait MetricSink {
    fn publish(&mut self, batch: &[MetricSet]) -> std::result::Result<(), SinkError>;
}

/// Writes each batch as one JSON array per line.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> MetricSink for JsonSink<W> {
    fn publish(&mut self, batch: &[MetricSet]) -> std::result::Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, batch)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A contiguous slice of a result sequence that knows where it sits in it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Batch<'a, T> {
    pub start: usize,
    pub items: &'a [T],
}

impl<T> Batch<'_, T> {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.items.len()
    }
}

/// Split `items` into order-preserving batches of at most `max_size` (0 acts as 1).
pub fn batches<T>(items: &[T], max_size: usize) -> impl Iterator<Item = Batch<'_, T>> {
    let size = max_size.max(1);
    items
        .chunks(size)
        .enumerate()
        .map(move |(i, chunk)| Batch {
            start: i * size,
            items: chunk,
        })
}

/// Publish `records` batch by batch. Stops at the first failed delivery; earlier
/// batches stay delivered. Returns the number of metric sets published.
pub fn ingest_in_batches<T: ToAttributes>(
    sink: &mut dyn MetricSink,
    event_type: &str,
    records: &[T],
    batch_size: usize,
    collection_timestamp: &str,
) -> Result<usize> {
    let mut published = 0;
    for batch in batches(records, batch_size) {
        let metric_sets: Vec<MetricSet> = batch
            .items
            .iter()
            .map(|r| MetricSet::from_record(event_type, r, collection_timestamp))
            .collect();

        let range = batch.range();
        sink.publish(&metric_sets).map_err(|e| {
            QueryLensError::new(
                ErrorCode::IngestionError,
                format!(
                    "Failed to deliver {} records [{}..{}): {}",
                    event_type, range.start, range.end, e
                ),
            )
            .with_context(ErrorContext::Ingestion {
                event_type: event_type.to_string(),
                start: range.start,
                end: range.end,
                total: records.len(),
            })
        })?;

        debug!(event_type, start = range.start, end = range.end, "Delivered batch");
        published += metric_sets.len();
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Attr(&'static str, String);

    impl ToAttributes for Attr {
        fn attributes(&self) -> Vec<(&'static str, String)> {
            vec![(self.0, self.1.clone())]
        }
    }

    /// Records every delivered batch; fails the delivery at `fail_at` (0-based).
    #[derive(Default)]
    struct CountingSink {
        delivered: Vec<usize>,
        fail_at: Option<usize>,
    }

    impl MetricSink for CountingSink {
        fn publish(&mut self, batch: &[MetricSet]) -> std::result::Result<(), SinkError> {
            if self.fail_at == Some(self.delivered.len()) {
                return Err(SinkError::Rejected("backend unavailable".to_string()));
            }
            self.delivered.push(batch.len());
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<Attr> {
        (0..n).map(|i| Attr("n", i.to_string())).collect()
    }

    #[test]
    fn test_classification() {
        assert_eq!(MetricValue::classify("12.5".into()), MetricValue::Gauge(12.5));
        assert_eq!(MetricValue::classify("7".into()), MetricValue::Gauge(7.0));
        assert_eq!(
            MetricValue::classify("0x7F3A".into()),
            MetricValue::Attribute("0x7F3A".into())
        );
        assert_eq!(
            MetricValue::classify("NaN".into()),
            MetricValue::Attribute("NaN".into())
        );
    }

    #[test]
    fn test_batches_cover_input() {
        let items: Vec<u32> = (0..10).collect();
        let ranges: Vec<_> = batches(&items, 4).map(|b| b.range()).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(batches(&items, 0).count(), 10);
        assert_eq!(batches::<u32>(&[], 3).count(), 0);
    }

    #[test]
    fn test_ingest_delivers_all_batches() {
        let mut sink = CountingSink::default();
        let published = ingest_in_batches(&mut sink, "Evt", &records(5), 2, "ts").unwrap();
        assert_eq!(published, 5);
        assert_eq!(sink.delivered, vec![2, 2, 1]);
    }

    #[test]
    fn test_failed_delivery_reports_range_and_stops() {
        let mut sink = CountingSink {
            fail_at: Some(1),
            ..Default::default()
        };
        let err = ingest_in_batches(&mut sink, "Evt", &records(7), 3, "ts").unwrap_err();

        assert_eq!(err.code, ErrorCode::IngestionError);
        assert_eq!(
            err.context,
            Some(ErrorContext::Ingestion {
                event_type: "Evt".to_string(),
                start: 3,
                end: 6,
                total: 7,
            })
        );
        assert_eq!(sink.delivered, vec![3]);
    }

    #[test]
    fn test_json_sink_writes_one_line_per_batch() {
        let mut sink = JsonSink::new(Vec::new());
        ingest_in_batches(&mut sink, "MssqlWaitAnalysis", &records(3), 2, "2026-01-01T00:00:00Z")
            .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first[0]["event_type"], "MssqlWaitAnalysis");
        assert_eq!(first[0]["n"], 0.0);
        assert_eq!(first[1]["collection_timestamp"], "2026-01-01T00:00:00Z");
    }
}
