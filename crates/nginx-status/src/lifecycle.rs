//! StatusInput — the host-facing lifecycle of one poller.
//!
//! ```text
//! configure() ──► Idle ──start()──► Running ──shutdown()──► Stopped
//!                   └───────────shutdown()──────────────────┘
//! ```
//!
//! `start` spawns a dedicated OS thread that owns a single-threaded tokio
//! runtime and runs [`PollScheduler::run`]. `shutdown` flips the watch
//! signal, then joins the thread. The loop finishes any tick in progress
//! before it observes the signal, so once `shutdown` returns no tick is
//! running and none will start.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::watch;
use tracing::{error, info};

use crate::config::StatusConfig;
use crate::emitter::Sink;
use crate::error::{ConfigResult, LifecycleError};
use crate::scheduler::PollScheduler;

const THREAD_NAME: &str = "nginx-status";

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Running,
    Stopped,
}

enum State {
    Idle(PollScheduler),
    Running {
        shutdown_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// One configured status poller.
pub struct StatusInput {
    config: Arc<StatusConfig>,
    state: State,
}

impl StatusInput {
    /// Validate the host's raw mapping and prepare a poller that emits
    /// into `sink`. Nothing runs until [`start`](Self::start).
    pub fn configure(raw: &toml::Table, sink: Arc<dyn Sink>) -> ConfigResult<Self> {
        info!("nginx status monitor initializing");
        let config = StatusConfig::from_table(raw)?;
        Self::new(config, sink)
    }

    /// Prepare a poller from an already validated config.
    pub fn new(config: StatusConfig, sink: Arc<dyn Sink>) -> ConfigResult<Self> {
        let config = Arc::new(config);
        let scheduler = PollScheduler::new(config.clone(), sink)?;
        Ok(Self {
            config,
            state: State::Idle(scheduler),
        })
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        match self.state {
            State::Idle(_) => LifecycleState::Idle,
            State::Running { .. } => LifecycleState::Running,
            State::Stopped => LifecycleState::Stopped,
        }
    }

    /// Whether the poller thread is alive. `false` after the thread died
    /// on its own, even though the state is still `Running`.
    pub fn is_running(&self) -> bool {
        match &self.state {
            State::Running { handle, .. } => !handle.is_finished(),
            _ => false,
        }
    }

    /// Spawn the poller thread and start the timer.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        let scheduler = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Idle(scheduler) => scheduler,
            running @ State::Running { .. } => {
                self.state = running;
                return Err(LifecycleError::AlreadyStarted);
            }
            State::Stopped => return Err(LifecycleError::Stopped),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_poller(scheduler, shutdown_rx))?;

        self.state = State::Running {
            shutdown_tx,
            handle,
        };
        info!(url = %self.config.url(), "nginx status monitor started");
        Ok(())
    }

    /// Stop the timer and wait for the poller thread to exit.
    ///
    /// Blocks until a tick in progress has completed. Calling it on an idle
    /// or already stopped input just moves it to `Stopped`.
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        let State::Running {
            shutdown_tx,
            handle,
        } = std::mem::replace(&mut self.state, State::Stopped)
        else {
            return Ok(());
        };

        info!("nginx status monitor stopping");
        // The receiver is gone if the thread already exited; join reports why.
        let _ = shutdown_tx.send(true);

        match handle.join() {
            Ok(()) => {
                info!("nginx status monitor stopped");
                Ok(())
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(%reason, "nginx status thread terminated unexpectedly");
                Err(LifecycleError::Panicked(reason))
            }
        }
    }
}

impl Drop for StatusInput {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "status input dropped with a failed poller");
        }
    }
}

/// Body of the poller thread.
fn run_poller(scheduler: PollScheduler, shutdown: watch::Receiver<bool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "unexpected error: failed to build poller runtime");
            return;
        }
    };
    runtime.block_on(scheduler.run(shutdown));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
