//! Emission policy — turns a [`StatusSample`] into records for the sink.
//!
//! Two modes, chosen by `multi_events`:
//!
//! ```text
//! combined:  emit(tag, now, {active, accepted, ..., waiting, tag, server})
//! multi:     emit_stream(tag, [(now, {active, tag, server}),
//!                              (now, {accepted, tag, server}), ...])
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::config::StatusConfig;
use crate::parser::{Metric, StatusSample};

/// Capture time of a record, in seconds since the Unix epoch.
pub type EventTime = u64;

/// One emitted record: metric fields plus `tag` and `server` context.
///
/// Serializes as a flat object with metric keys in document order,
/// followed by `tag` and `server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    metrics: Vec<(Metric, u64)>,
    tag: String,
    server: String,
}

impl Record {
    fn new(metrics: Vec<(Metric, u64)>, config: &StatusConfig) -> Self {
        Self {
            metrics,
            tag: config.tag.clone(),
            server: config.server_name.clone(),
        }
    }

    /// Metric fields carried by this record, in document order.
    pub fn metrics(&self) -> &[(Metric, u64)] {
        &self.metrics
    }

    /// Look up a metric value by its field name.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.metrics
            .iter()
            .find(|(m, _)| m.name() == name)
            .map(|(_, v)| *v)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// All field names, metrics first, then `tag` and `server`.
    pub fn keys(&self) -> Vec<&'static str> {
        self.metrics
            .iter()
            .map(|(m, _)| m.name())
            .chain(["tag", "server"])
            .collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len() + 2))?;
        for (metric, value) in &self.metrics {
            map.serialize_entry(metric.name(), value)?;
        }
        map.serialize_entry("tag", &self.tag)?;
        map.serialize_entry("server", &self.server)?;
        map.end()
    }
}

/// Destination for emitted records — the host's event router.
///
/// Called from the poller thread, hence `Send + Sync`. Implementations
/// must not panic on delivery problems; they own their error handling.
pub trait Sink: Send + Sync {
    /// Deliver a single record.
    fn emit(&self, tag: &str, time: EventTime, record: Record);

    /// Deliver an ordered batch of records.
    fn emit_stream(&self, tag: &str, events: Vec<(EventTime, Record)>);
}

/// Hand one sample to the sink according to `config.multi_events`.
///
/// Returns the number of records emitted.
pub fn emit(sample: &StatusSample, config: &StatusConfig, now: EventTime, sink: &dyn Sink) -> usize {
    if config.multi_events {
        let events: Vec<(EventTime, Record)> = sample
            .values()
            .into_iter()
            .map(|pair| (now, Record::new(vec![pair], config)))
            .collect();
        let count = events.len();
        sink.emit_stream(&config.tag, events);
        count
    } else {
        let record = Record::new(sample.values().to_vec(), config);
        sink.emit(&config.tag, now, record);
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkEvent};

    fn sample() -> StatusSample {
        StatusSample {
            active: 3,
            accepted: 5,
            handled: 5,
            total: 10,
            reading: 0,
            writing: 1,
            waiting: 2,
        }
    }

    fn config(multi_events: bool) -> StatusConfig {
        StatusConfig {
            server_name: "host1".to_string(),
            multi_events,
            ..StatusConfig::default()
        }
    }

    #[test]
    fn combined_mode_emits_one_full_record() {
        let sink = MemorySink::new();
        let count = emit(&sample(), &config(false), 1_700_000_000, &sink);
        assert_eq!(count, 1);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let SinkEvent { tag, time, record } = &events[0];
        assert_eq!(tag, "nginx.status");
        assert_eq!(*time, 1_700_000_000);
        assert_eq!(
            record.keys(),
            ["active", "accepted", "handled", "total", "reading", "writing", "waiting", "tag", "server"]
        );
        assert_eq!(record.get("total"), Some(10));
        assert_eq!(record.tag(), "nginx.status");
        assert_eq!(record.server(), "host1");
        assert_eq!(sink.batches(), 0);
    }

    #[test]
    fn multi_mode_emits_seven_single_metric_records() {
        let sink = MemorySink::new();
        let count = emit(&sample(), &config(true), 42, &sink);
        assert_eq!(count, 7);

        let events = sink.events();
        assert_eq!(events.len(), 7);
        assert_eq!(sink.batches(), 1);

        let names: Vec<&str> = events
            .iter()
            .map(|e| {
                assert_eq!(e.record.metrics().len(), 1);
                assert_eq!(e.record.keys().len(), 3);
                assert_eq!(e.time, 42);
                assert_eq!(e.tag, "nginx.status");
                assert_eq!(e.record.server(), "host1");
                e.record.metrics()[0].0.name()
            })
            .collect();
        assert_eq!(
            names,
            ["active", "accepted", "handled", "total", "reading", "writing", "waiting"]
        );

        let values: Vec<u64> = events.iter().map(|e| e.record.metrics()[0].1).collect();
        assert_eq!(values, [3, 5, 5, 10, 0, 1, 2]);
    }

    #[test]
    fn record_serializes_as_flat_object() {
        let sink = MemorySink::new();
        emit(&sample(), &config(false), 0, &sink);
        let json = serde_json::to_string(&sink.events()[0].record).unwrap();
        assert_eq!(
            json,
            r#"{"active":3,"accepted":5,"handled":5,"total":10,"reading":0,"writing":1,"waiting":2,"tag":"nginx.status","server":"host1"}"#
        );
    }

    #[test]
    fn single_metric_record_serializes_with_context() {
        let sink = MemorySink::new();
        emit(&sample(), &config(true), 0, &sink);
        let json = serde_json::to_string(&sink.events()[3].record).unwrap();
        assert_eq!(json, r#"{"total":10,"tag":"nginx.status","server":"host1"}"#);
    }
}
