//! Built-in sinks.
//!
//! - [`MemorySink`] keeps every event in memory (embedding, tests).
//! - [`JsonLinesSink`] writes one JSON object per event to any writer.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::error;

use crate::emitter::{EventTime, Record, Sink};

/// An event as received by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkEvent {
    pub tag: String,
    pub time: EventTime,
    pub record: Record,
}

#[derive(Debug, Default)]
struct MemoryState {
    events: Vec<SinkEvent>,
    batches: usize,
}

/// Collects events in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().events.clone()
    }

    /// Number of `emit_stream` calls received.
    pub fn batches(&self) -> usize {
        self.lock().batches
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Sink for MemorySink {
    fn emit(&self, tag: &str, time: EventTime, record: Record) {
        self.lock().events.push(SinkEvent {
            tag: tag.to_string(),
            time,
            record,
        });
    }

    fn emit_stream(&self, tag: &str, events: Vec<(EventTime, Record)>) {
        let mut state = self.lock();
        state.batches += 1;
        state
            .events
            .extend(events.into_iter().map(|(time, record)| SinkEvent {
                tag: tag.to_string(),
                time,
                record,
            }));
    }
}

/// Writes `{"tag":..,"time":..,"record":{..}}` lines to a writer.
///
/// Write failures are logged and the event is dropped.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consume the sink and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_events(&self, tag: &str, events: &[(EventTime, &Record)]) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (time, record) in events {
            let line = JsonLine { tag, time: *time, record };
            let result = serde_json::to_writer(&mut *out, &line)
                .map_err(std::io::Error::from)
                .and_then(|()| out.write_all(b"\n"));
            if let Err(e) = result {
                error!(%tag, error = %e, "failed to write record");
                return;
            }
        }
        if let Err(e) = out.flush() {
            error!(%tag, error = %e, "failed to flush records");
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    tag: &'a str,
    time: EventTime,
    record: &'a Record,
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn emit(&self, tag: &str, time: EventTime, record: Record) {
        self.write_events(tag, &[(time, &record)]);
    }

    fn emit_stream(&self, tag: &str, events: Vec<(EventTime, Record)>) {
        let borrowed: Vec<(EventTime, &Record)> = events.iter().map(|(t, r)| (*t, r)).collect();
        self.write_events(tag, &borrowed);
    }
}
