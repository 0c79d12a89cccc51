//! StatusConfig — raw host mapping to a validated poller configuration.
//!
//! The host hands over a flat key/value mapping (a TOML table). Only the
//! keys below are recognized; anything else is ignored with a warning.
//!
//! | key            | accepted values            | default          |
//! |----------------|----------------------------|------------------|
//! | `tag`          | string                     | `nginx.status`   |
//! | `host`         | string                     | `localhost`      |
//! | `port`         | integer or numeric string  | `80`             |
//! | `path`         | string                     | `/nginx_status`  |
//! | `interval`     | seconds, integer or float  | `1`              |
//! | `server_name`  | string                     | local hostname   |
//! | `multi_events` | bool or `"true"`/`"false"` | `false`          |

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_TAG: &str = "nginx.status";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_PATH: &str = "/nginx_status";
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;

/// Shortest accepted polling period.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// The only port that switches the fetcher to HTTPS.
pub const TLS_PORT: u16 = 443;

/// URL scheme used to reach the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// Validated poller configuration. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusConfig {
    /// Tag records are emitted under (also copied into each record).
    pub tag: String,
    /// Status page host.
    pub host: String,
    /// Status page port. `443` selects HTTPS.
    pub port: u16,
    /// Status page path, e.g. `/nginx_status`.
    pub path: String,
    /// Polling period.
    pub interval: Duration,
    /// Value of the `server` field in every record.
    pub server_name: String,
    /// Emit one record per metric instead of one combined record.
    pub multi_events: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            interval: Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
            server_name: local_hostname(),
            multi_events: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    tag: Option<String>,
    host: Option<String>,
    port: Option<NumberOrText>,
    path: Option<String>,
    interval: Option<NumberOrText>,
    server_name: Option<String>,
    multi_events: Option<FlagValue>,
    #[serde(flatten)]
    unrecognized: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Integer(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Text(String),
}

impl StatusConfig {
    /// Build a config from the host's raw key/value mapping.
    pub fn from_table(table: &toml::Table) -> ConfigResult<Self> {
        let raw: RawConfig = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Malformed(e.to_string()))?;

        for key in raw.unrecognized.keys() {
            warn!(%key, "ignoring unrecognized configuration key");
        }

        let port = match raw.port {
            Some(value) => parse_port(value)?,
            None => DEFAULT_PORT,
        };
        let interval = match raw.interval {
            Some(value) => parse_interval(value)?,
            None => Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
        };
        let multi_events = match raw.multi_events {
            Some(FlagValue::Bool(b)) => b,
            Some(FlagValue::Text(s)) => match s.as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "multi_events",
                        reason: format!("expected true or false, got {s:?}"),
                    });
                }
            },
            None => false,
        };

        Ok(Self {
            tag: raw.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            host: raw.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            path: raw.path.unwrap_or_else(|| DEFAULT_PATH.to_string()),
            interval,
            server_name: raw.server_name.unwrap_or_else(local_hostname),
            multi_events,
        })
    }

    /// HTTPS on port 443, plain HTTP everywhere else.
    pub fn scheme(&self) -> Scheme {
        if self.port == TLS_PORT {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }

    /// `host:port`, used for both the socket address and the Host header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full URL of the status page.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme(), self.authority(), self.path)
    }
}

fn parse_port(value: NumberOrText) -> ConfigResult<u16> {
    let invalid = |reason: String| ConfigError::InvalidValue { key: "port", reason };
    let port = match value {
        NumberOrText::Integer(n) => n,
        NumberOrText::Float(f) => return Err(invalid(format!("expected an integer, got {f}"))),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(format!("expected an integer, got {s:?}")))?,
    };
    match u16::try_from(port) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(invalid(format!("{port} is outside 1-65535"))),
    }
}

fn parse_interval(value: NumberOrText) -> ConfigResult<Duration> {
    let invalid = |reason: String| ConfigError::InvalidValue { key: "interval", reason };
    let secs = match value {
        NumberOrText::Integer(n) => n as f64,
        NumberOrText::Float(f) => f,
        NumberOrText::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("expected a number of seconds, got {s:?}")))?,
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(format!("must be a positive number of seconds, got {secs}")));
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(period) if period >= MIN_INTERVAL => Ok(period),
        Ok(_) => Err(invalid(format!(
            "{secs} seconds is below the minimum of {}ms",
            MIN_INTERVAL.as_millis()
        ))),
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// The machine's hostname, or `localhost` if it cannot be read.
pub fn local_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return DEFAULT_HOST.to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    match String::from_utf8_lossy(&buf[..end]).into_owned() {
        name if name.is_empty() => DEFAULT_HOST.to_string(),
        name => name,
    }
}
