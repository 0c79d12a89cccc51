//! nginx-status — periodic collection of nginx `stub_status` counters.
//!
//! Polls a status page on a fixed interval, parses the seven connection
//! counters, and hands them to a host-provided [`Sink`] as timestamped
//! records.
//!
//! # Architecture
//!
//! ```text
//! StatusInput (lifecycle: Idle → Running → Stopped)
//!   └── dedicated thread + current-thread tokio runtime
//!       └── PollScheduler::run() — one timer, sequential ticks
//!           ├── StatusFetcher::fetch()  → body | FetchError
//!           ├── parser::parse()         → StatusSample | ParseError
//!           └── emitter::emit()         → Sink::emit / Sink::emit_stream
//! ```
//!
//! # Failure isolation
//!
//! Fetch and parse failures are logged at the tick boundary and the loop
//! waits for the next firing. Nothing is retried within a tick and no
//! partial record is ever emitted.

pub mod config;
pub mod emitter;
pub mod error;
pub mod fetcher;
pub mod lifecycle;
pub mod parser;
pub mod scheduler;
pub mod sink;

pub use config::{Scheme, StatusConfig};
pub use emitter::{EventTime, Record, Sink};
pub use error::{ConfigError, FetchError, LifecycleError, ParseError};
pub use fetcher::StatusFetcher;
pub use lifecycle::{LifecycleState, StatusInput};
pub use parser::{Metric, StatusSample, parse};
pub use scheduler::{PollScheduler, TickOutcome};
pub use sink::{JsonLinesSink, MemorySink, SinkEvent};
