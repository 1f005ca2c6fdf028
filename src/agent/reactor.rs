//! The event loop thread.
//!
//! Everything that touches the endpoint, the generator, the watchers or
//! inline tails runs here. Background threads only communicate through
//! channels drained by [`Reactor::run`].

use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, TryRecvError, select};
use log::{debug, error, info, warn};

use crate::{
    endpoint::{Endpoint, EndpointEvent},
    glob_watch::GlobWatcher,
    message::MessageGenerator,
    tailer::{TailEvent, TailMode},
};

use super::registry::{Discovery, Registry};

/// Upper bound on a single wait so a stalled timer cannot park the loop.
const MAX_WAIT: Duration = Duration::from_secs(1);

pub(crate) struct Reactor {
    pub(crate) generator: MessageGenerator<Endpoint>,
    pub(crate) watchers: Vec<GlobWatcher>,
    pub(crate) registry: Registry,
    pub(crate) mode: TailMode,
    pub(crate) poll_interval: Duration,
    pub(crate) next_poll: Instant,
    pub(crate) tail_rx: Receiver<TailEvent>,
    pub(crate) endpoint_rx: Receiver<EndpointEvent>,
    pub(crate) shutdown_rx: Receiver<()>,
}

fn should_shutdown_now(shutdown_rx: &Receiver<()>) -> bool {
    matches!(
        shutdown_rx.try_recv(),
        Ok(()) | Err(TryRecvError::Disconnected)
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl Reactor {
    /// Drive timers and channel events until shutdown is requested.
    pub(crate) fn run(mut self) {
        loop {
            if should_shutdown_now(&self.shutdown_rx) {
                break;
            }
            let now = Instant::now();
            let timeout = self
                .next_deadline(now)
                .saturating_duration_since(now)
                .min(MAX_WAIT);
            select! {
                recv(self.shutdown_rx) -> _ => break,
                recv(self.endpoint_rx) -> event => {
                    if let Ok(event) = event {
                        self.guarded("endpoint event", |r| {
                            r.generator.destination_mut().handle_event(event, Instant::now());
                        });
                    }
                }
                recv(self.tail_rx) -> event => {
                    if let Ok(event) = event {
                        self.guarded("tail event", |r| r.handle_tail_event(event));
                    }
                }
                default(timeout) => {}
            }
            self.run_timers(Instant::now());
        }
        info!("event loop stopped");
    }

    /// Run `f`, logging instead of propagating any panic.
    fn guarded(&mut self, what: &str, f: impl FnOnce(&mut Self)) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            error!("{what} panicked: {}", panic_message(payload.as_ref()));
        }
    }

    fn next_deadline(&self, now: Instant) -> Instant {
        let mut deadline = now + MAX_WAIT;
        for watcher in &self.watchers {
            deadline = deadline.min(watcher.next_due());
        }
        if self.mode == TailMode::Reactor && !self.registry.is_empty() {
            deadline = deadline.min(self.next_poll);
        }
        if let Some(endpoint_due) = self.generator.destination().next_deadline(now) {
            deadline = deadline.min(endpoint_due);
        }
        deadline
    }

    pub(crate) fn run_timers(&mut self, now: Instant) {
        for index in 0..self.watchers.len() {
            if self.watchers[index].is_due(now) {
                self.guarded("glob rescan", |r| r.rescan(index, now));
            }
        }
        if self.mode == TailMode::Reactor && now >= self.next_poll {
            self.next_poll = now + self.poll_interval;
            self.guarded("file poll", Reactor::poll_files);
        }
        self.guarded("endpoint timer", |r| {
            r.generator.destination_mut().on_tick(now);
        });
    }

    fn rescan(&mut self, index: usize, now: Instant) {
        let diff = self.watchers[index].rescan(now);
        for path in diff.deleted {
            if let Some(key) = self.registry.file_deleted(index, &path) {
                info!("{} deleted; stopped tailing", key.display());
            }
        }
        for path in diff.found {
            match self.registry.file_found(index, &path) {
                Ok(Discovery::Started { key, .. }) => {
                    info!("tailing {} ({} files)", key.display(), self.registry.len());
                }
                Ok(Discovery::Shared | Discovery::Known) => {
                    debug!("{} already tailed", path.display());
                }
                Err(err) => {
                    warn!("unable to tail {}: {err}", path.display());
                    self.watchers[index].forget(&path);
                }
            }
        }
    }

    fn poll_files(&mut self) {
        let generator = &mut self.generator;
        let failed = self.registry.poll_inline(|tag, lines| {
            for line in &lines {
                generator.transmit(tag, line);
            }
        });
        for (id, err) in failed {
            self.stop_failed(id, err);
        }
    }

    fn handle_tail_event(&mut self, event: TailEvent) {
        match event {
            TailEvent::Lines { id, lines } => {
                let Some(tag) = self.registry.tag(id).map(str::to_string) else {
                    return;
                };
                for line in &lines {
                    self.generator.transmit(&tag, line);
                }
            }
            TailEvent::Failed { id, error } => self.stop_failed(id, error),
        }
    }

    /// Stop a tail after an unrecoverable read error and let the watchers
    /// rediscover the file on their next rescan.
    fn stop_failed(&mut self, id: u64, err: io::Error) {
        let Some((key, aliases)) = self.registry.remove(id) else {
            return;
        };
        error!("error reading {}: {err}; stopped tailing", key.display());
        for (index, path) in aliases {
            if let Some(watcher) = self.watchers.get_mut(index) {
                watcher.forget(&path);
            }
        }
    }
}
