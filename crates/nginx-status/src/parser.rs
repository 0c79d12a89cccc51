//! stub_status body parser.
//!
//! The nginx status page is a fixed three-line report:
//!
//! ```text
//! Active connections: 291
//! server accepts handled requests
//!  16630948 16630948 31070465
//! Reading: 6 Writing: 179 Waiting: 106
//! ```
//!
//! The whole body is matched against one pattern. Either all seven
//! counters are captured or the body is rejected; there is no partial
//! or line-by-line recovery.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

/// Counters reported by one status page, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusSample {
    pub active: u64,
    pub accepted: u64,
    pub handled: u64,
    pub total: u64,
    pub reading: u64,
    pub writing: u64,
    pub waiting: u64,
}

/// One of the seven stub_status counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Active,
    Accepted,
    Handled,
    Total,
    Reading,
    Writing,
    Waiting,
}

impl Metric {
    /// All metrics in the order they appear in the status page.
    pub const ALL: [Metric; 7] = [
        Metric::Active,
        Metric::Accepted,
        Metric::Handled,
        Metric::Total,
        Metric::Reading,
        Metric::Writing,
        Metric::Waiting,
    ];

    /// Field name used in emitted records.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Active => "active",
            Metric::Accepted => "accepted",
            Metric::Handled => "handled",
            Metric::Total => "total",
            Metric::Reading => "reading",
            Metric::Writing => "writing",
            Metric::Waiting => "waiting",
        }
    }
}

impl StatusSample {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Active => self.active,
            Metric::Accepted => self.accepted,
            Metric::Handled => self.handled,
            Metric::Total => self.total,
            Metric::Reading => self.reading,
            Metric::Writing => self.writing,
            Metric::Waiting => self.waiting,
        }
    }

    /// `(metric, value)` pairs in document order.
    pub fn values(&self) -> [(Metric, u64); 7] {
        Metric::ALL.map(|m| (m, self.get(m)))
    }
}

// Line 1: "<words>: N \n"
// Line 2: "<lowercase words and whitespace>A H T \n" (the header line and the
//         leading whitespace of the numbers line are absorbed together)
// Line 3: "<Label> R <Label> W <Label> T"
// `^` is line-anchored, and trailing content after the last counter is ignored.
// Unicode is off, so `\s` is ASCII whitespace only (no NBSP, em space, ...).
static STUB_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m-u)^[a-zA-Z\s]+:\s([0-9]+?)\s\n[a-z\s]+([0-9]+)\s([0-9]+)\s([0-9]+)\s\n[a-zA-Z:?]+\s([0-9]+)\s[a-zA-Z:?]+\s([0-9]+)\s[a-zA-Z:?]+\s([0-9]+)",
    )
    .expect("stub_status pattern compiles")
});

const EXCERPT_CHARS: usize = 40;

/// Parse a stub_status body into a [`StatusSample`].
pub fn parse(body: &str) -> Result<StatusSample, ParseError> {
    let caps = STUB_STATUS.captures(body).ok_or_else(|| ParseError::Mismatch {
        len: body.len(),
        excerpt: body.chars().take(EXCERPT_CHARS).collect(),
    })?;

    let mut values = [0u64; 7];
    for (i, metric) in Metric::ALL.into_iter().enumerate() {
        // Every group is mandatory in the pattern, so a match captures all seven.
        let literal = caps.get(i + 1).map_or("", |m| m.as_str());
        values[i] = literal.parse().map_err(|_| ParseError::OutOfRange {
            field: metric.name(),
            literal: literal.to_string(),
        })?;
    }

    let [active, accepted, handled, total, reading, writing, waiting] = values;
    Ok(StatusSample {
        active,
        accepted,
        handled,
        total,
        reading,
        writing,
        waiting,
    })
}
