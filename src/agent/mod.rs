//! Agent lifecycle.
//!
//! An [`Agent`] owns the event-loop thread. Starting it builds one
//! endpoint, one message generator bound to it and one glob watcher per
//! configured path; stopping it ends the loop and drops everything,
//! including any frames still queued for a stream endpoint.

mod reactor;
mod registry;

#[cfg(test)]
mod tests;

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    config::{AgentConfig, ConfigError},
    endpoint::Endpoint,
    glob_watch::GlobWatcher,
    message::MessageGenerator,
};

use reactor::Reactor;
use registry::Registry;

/// Lifecycle of an [`Agent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Stopped,
    Running,
    Stopping,
}

/// Errors returned by agent lifecycle operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent is already running")]
    AlreadyRunning,
    #[error("failed to start event loop: {0}")]
    Spawn(#[source] io::Error),
}

/// Forwards tailed files to a syslog collector.
pub struct Agent {
    config: AgentConfig,
    state: Arc<Mutex<AgentState>>,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Agent {
    /// Validate `config` and create a stopped agent.
    pub fn new(config: AgentConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(AgentState::Stopped)),
            shutdown_tx: None,
            handle: None,
        })
    }

    /// Validate `config` and start forwarding immediately.
    pub fn launch(config: AgentConfig) -> Result<Self, AgentError> {
        let mut agent = Self::new(config)?;
        agent.start()?;
        Ok(agent)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    /// Build the pipeline and spawn the event loop.
    ///
    /// Fails with [`AgentError::Config`] when TLS material cannot be
    /// loaded; an unreachable collector is not an error.
    pub fn start(&mut self) -> Result<(), AgentError> {
        {
            let state = self.state.lock();
            if *state != AgentState::Stopped {
                return Err(AgentError::AlreadyRunning);
            }
        }

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let reactor = self.build_reactor(shutdown_rx)?;
        let handle = thread::Builder::new()
            .name("remote_syslog-reactor".into())
            .spawn(move || reactor.run())
            .map_err(AgentError::Spawn)?;

        let dest = &self.config.destination;
        info!(
            "forwarding {} watch target(s) to {}:{} over {}",
            self.config.watch.paths.len(),
            dest.host,
            dest.port,
            dest.protocol.label()
        );
        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        *self.state.lock() = AgentState::Running;
        Ok(())
    }

    /// Stop the event loop and wait for it to exit. Queued stream frames
    /// are discarded.
    pub fn stop(&mut self) {
        {
            let mut state = self.state.lock();
            if *state != AgentState::Running {
                return;
            }
            *state = AgentState::Stopping;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("event loop thread panicked");
        }
        *self.state.lock() = AgentState::Stopped;
        info!("agent stopped");
    }

    fn build_reactor(&self, shutdown_rx: Receiver<()>) -> Result<Reactor, ConfigError> {
        let (endpoint_tx, endpoint_rx) = unbounded();
        let (tail_tx, tail_rx) = unbounded();
        let endpoint = Endpoint::new(&self.config.destination, endpoint_tx)?;
        let generator = MessageGenerator::new(
            self.config.syslog.clone(),
            self.config.destination.max_message_size(),
            endpoint,
        );
        let watch = &self.config.watch;
        let watchers = watch
            .paths
            .iter()
            .map(|pattern| {
                GlobWatcher::new(pattern, watch.exclude_files.clone(), watch.rescan_interval)
                    .map_err(|source| ConfigError::Glob {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Reactor {
            generator,
            watchers,
            registry: Registry::new(watch.mode, watch.poll_interval, tail_tx),
            mode: watch.mode,
            poll_interval: watch.poll_interval,
            next_poll: Instant::now(),
            tail_rx,
            endpoint_rx,
            shutdown_rx,
        })
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("state", &self.state())
            .field("destination", &self.config.destination.host)
            .finish()
    }
}
