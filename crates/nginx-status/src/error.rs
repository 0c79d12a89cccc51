//! Error types for the status poller.
//!
//! `ConfigError` is fatal and surfaces from configuration. `FetchError` and
//! `ParseError` are per-tick outcomes that the scheduler logs and swallows.
//! `LifecycleError` covers misuse of the start/shutdown state machine and
//! a background thread that died.

use thiserror::Error;

/// Errors raised while building a [`StatusConfig`](crate::StatusConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("malformed configuration: {0}")]
    Malformed(String),

    #[error("tls client setup failed: {0}")]
    Tls(String),
}

/// Outcome of a fetch that did not yield a body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered, but not with `200 OK`.
    #[error("status page returned HTTP {0}")]
    NonOkStatus(u16),

    /// DNS, connect, TLS handshake, request, or timeout failure.
    #[error("request to {url} failed: {cause}")]
    Transport { url: String, cause: String },
}

/// The response body did not match the stub_status layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("body does not match stub_status layout ({len} bytes, starts with {excerpt:?})")]
    Mismatch { len: usize, excerpt: String },

    #[error("counter '{field}' out of range: {literal}")]
    OutOfRange { field: &'static str, literal: String },
}

/// Errors from the start/shutdown state machine.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("poller already started")]
    AlreadyStarted,

    #[error("poller has been shut down")]
    Stopped,

    #[error("failed to spawn poller thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("poller thread terminated unexpectedly: {0}")]
    Panicked(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
