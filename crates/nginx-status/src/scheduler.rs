//! Poll scheduler — the timer loop and the per-tick pipeline.
//!
//! Each tick runs fetch → parse → emit to completion before the loop looks
//! at the timer or the shutdown signal again, so ticks never overlap and a
//! tick that is already running always finishes.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::{MIN_INTERVAL, StatusConfig};
use crate::emitter::{self, EventTime, Sink};
use crate::error::{ConfigError, ConfigResult, FetchError, ParseError};
use crate::fetcher::StatusFetcher;
use crate::parser;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The sample was parsed and this many records were emitted.
    Emitted(usize),
    FetchFailed(FetchError),
    ParseFailed(ParseError),
}

/// Runs the fetch/parse/emit pipeline on a fixed period.
pub struct PollScheduler {
    config: Arc<StatusConfig>,
    fetcher: StatusFetcher,
    sink: Arc<dyn Sink>,
}

impl PollScheduler {
    pub fn new(config: Arc<StatusConfig>, sink: Arc<dyn Sink>) -> ConfigResult<Self> {
        // `tokio::time::interval` panics on a zero period.
        if config.interval < MIN_INTERVAL {
            return Err(ConfigError::InvalidValue {
                key: "interval",
                reason: format!("{:?} is below the minimum of {MIN_INTERVAL:?}", config.interval),
            });
        }
        let fetcher = StatusFetcher::new(&config)?;
        Ok(Self {
            config,
            fetcher,
            sink,
        })
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    /// Run one fetch/parse/emit cycle. Failures are logged and returned,
    /// never propagated.
    pub async fn tick(&self) -> TickOutcome {
        let body = match self.fetcher.fetch().await {
            Ok(body) => body,
            Err(FetchError::NonOkStatus(code)) => {
                error!(code, url = %self.fetcher.url(), "invalid nginx status response");
                return TickOutcome::FetchFailed(FetchError::NonOkStatus(code));
            }
            Err(e) => {
                error!(error = %e, "unable to fetch status page");
                return TickOutcome::FetchFailed(e);
            }
        };

        let sample = match parser::parse(&body) {
            Ok(sample) => sample,
            Err(e) => {
                error!(len = body.len(), error = %e, "unable to parse status page");
                return TickOutcome::ParseFailed(e);
            }
        };

        let count = emitter::emit(&sample, &self.config, epoch_secs(), self.sink.as_ref());
        debug!(records = count, tag = %self.config.tag, "status sample emitted");
        TickOutcome::Emitted(count)
    }

    /// Tick every `interval` until `shutdown` flips to `true` or its
    /// sender is dropped.
    ///
    /// The first tick fires one full interval after the loop starts. A tick
    /// that overruns the interval delays the next one instead of stacking.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            url = %self.fetcher.url(),
            interval_ms = period.as_millis() as u64,
            multi_events = self.config.multi_events,
            "status poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        // Drop the timer before returning so no firing outlives the loop.
        drop(timer);
        info!("status poller stopped");
    }
}

fn epoch_secs() -> EventTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
