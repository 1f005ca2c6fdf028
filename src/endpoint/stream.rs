//! Connection-oriented endpoint shared by TCP and TLS.
//!
//! The endpoint itself lives on the event-loop thread and never blocks.
//! Connecting, the TLS handshake and socket writes happen on a session
//! thread which reports back through [`EndpointEvent`]s. Each session
//! carries a generation number so events from an abandoned session are
//! ignored.

use std::{
    io,
    net::IpAddr,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use log::{debug, info, warn};

use crate::{config::Protocol, rate_limited_warner::RateLimitedWarner};

use super::{
    EndpointEvent,
    address::CachedAddress,
    send_queue::SendQueue,
    transport::{ActiveConnection, ConnectSpec, connect_transport},
};

/// Delay between a failed or lost connection and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Frames in flight between the endpoint and its session thread.
const SESSION_CAPACITY: usize = 256;
/// Retry interval for handing queued frames to a busy session.
const PUMP_INTERVAL: Duration = Duration::from_millis(10);
/// How often an idle session checks whether the peer hung up.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Replace embedded newlines and terminate the frame so one message is
/// always exactly one line on the wire.
pub fn frame_payload(mut payload: Vec<u8>) -> Vec<u8> {
    for byte in payload.iter_mut().filter(|b| **b == b'\n') {
        *byte = b' ';
    }
    payload.push(b'\n');
    payload
}

#[derive(Debug)]
struct Session {
    tx: Sender<Vec<u8>>,
}

#[derive(Debug)]
enum Link {
    Connecting(Session),
    Connected(Session),
    Waiting { retry_at: Instant },
}

/// TCP or TLS endpoint with a bounded backlog and endless reconnects.
#[derive(Debug)]
pub struct StreamEndpoint {
    protocol: Protocol,
    address: CachedAddress,
    spec: ConnectSpec,
    queue: SendQueue,
    link: Link,
    generation: u64,
    events: Sender<EndpointEvent>,
    evictions: RateLimitedWarner,
    failures: RateLimitedWarner,
}

impl StreamEndpoint {
    /// Create the endpoint and start the first connection attempt.
    pub fn new(
        protocol: Protocol,
        address: CachedAddress,
        spec: ConnectSpec,
        queue_limit: usize,
        events: Sender<EndpointEvent>,
    ) -> Self {
        let mut endpoint = Self {
            protocol,
            address,
            spec,
            queue: SendQueue::new(queue_limit),
            link: Link::Waiting {
                retry_at: Instant::now(),
            },
            generation: 0,
            events,
            evictions: RateLimitedWarner::default(),
            failures: RateLimitedWarner::default(),
        };
        endpoint.start_session(Instant::now());
        endpoint
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    /// Frames waiting for a connection.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue `payload` and hand as much of the backlog as possible to the
    /// current session. Never blocks.
    pub fn write(&mut self, payload: Vec<u8>) {
        if self.queue.push(frame_payload(payload)).is_some() {
            self.evictions.record_drop();
            self.evictions.warn_if_due(|count| {
                warn!(
                    "{} send queue full; dropped {count} oldest messages",
                    self.protocol
                );
            });
        }
        self.pump();
    }

    pub fn set_resolved(&mut self, ip: IpAddr) {
        self.address.set_resolved(ip);
    }

    pub fn handle_event(&mut self, event: EndpointEvent, now: Instant) {
        match event {
            EndpointEvent::Resolved(ip) => self.set_resolved(ip),
            EndpointEvent::Connected { generation } if generation == self.generation => {
                let link = std::mem::replace(&mut self.link, Link::Waiting { retry_at: now });
                self.link = match link {
                    Link::Connecting(session) => Link::Connected(session),
                    other => other,
                };
                info!(
                    "connected to {}:{} over {}",
                    self.address.host(),
                    self.address.port(),
                    self.protocol
                );
                self.failures.flush(|count| {
                    debug!("{count} connection attempts failed before connecting");
                });
                self.pump();
            }
            EndpointEvent::ConnectFailed { generation, error } if generation == self.generation => {
                self.failures.record_drop();
                self.failures.warn_if_due(|count| {
                    warn!(
                        "{} connection to {}:{} failed: {error} ({count} attempts)",
                        self.protocol,
                        self.address.host(),
                        self.address.port()
                    );
                });
                self.schedule_reconnect(now);
            }
            EndpointEvent::Disconnected { generation, error } if generation == self.generation => {
                match error {
                    Some(err) => warn!(
                        "{} connection to {}:{} lost: {err}",
                        self.protocol,
                        self.address.host(),
                        self.address.port()
                    ),
                    None => warn!(
                        "{} connection to {}:{} closed by peer",
                        self.protocol,
                        self.address.host(),
                        self.address.port()
                    ),
                }
                self.schedule_reconnect(now);
            }
            stale => debug!("ignoring stale endpoint event {stale:?}"),
        }
    }

    /// Run timers: reconnect when the delay has passed and retry handing
    /// the backlog to a busy session.
    pub fn on_tick(&mut self, now: Instant) {
        match self.link {
            Link::Waiting { retry_at } if now >= retry_at => self.start_session(now),
            Link::Connected(_) if !self.queue.is_empty() => self.pump(),
            _ => {}
        }
    }

    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        match &self.link {
            Link::Waiting { retry_at } => Some(*retry_at),
            Link::Connected(_) if !self.queue.is_empty() => Some(now + PUMP_INTERVAL),
            _ => None,
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        self.link = Link::Waiting {
            retry_at: now + RECONNECT_DELAY,
        };
    }

    fn start_session(&mut self, now: Instant) {
        self.generation += 1;
        let generation = self.generation;
        let (tx, rx) = bounded(SESSION_CAPACITY);
        let host = self.address.dial_host();
        let spec = self.spec.clone();
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name(format!("session-{generation}"))
            .spawn(move || session_loop(generation, host, spec, rx, events));
        self.link = match spawned {
            Ok(_) => Link::Connecting(Session { tx }),
            Err(err) => {
                warn!("unable to start connection thread: {err}");
                Link::Waiting {
                    retry_at: now + RECONNECT_DELAY,
                }
            }
        };
    }

    fn pump(&mut self) {
        let Link::Connected(session) = &self.link else {
            return;
        };
        let mut closed = false;
        while let Some(frame) = self.queue.pop_front() {
            match session.tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    self.queue.push_front(frame);
                    break;
                }
                Err(TrySendError::Disconnected(frame)) => {
                    self.queue.push_front(frame);
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            // The session exited; its Disconnected event schedules the
            // reconnect, this only stops further hand-offs.
            self.link = Link::Waiting {
                retry_at: Instant::now() + RECONNECT_DELAY,
            };
        }
    }
}

fn session_loop(
    generation: u64,
    host: String,
    spec: ConnectSpec,
    rx: Receiver<Vec<u8>>,
    events: Sender<EndpointEvent>,
) {
    let mut conn = match connect_transport(&host, &spec) {
        Ok(conn) => conn,
        Err(error) => {
            let _ = events.send(EndpointEvent::ConnectFailed { generation, error });
            return;
        }
    };
    if events.send(EndpointEvent::Connected { generation }).is_err() {
        return;
    }
    loop {
        match rx.recv_timeout(IDLE_CHECK_INTERVAL) {
            Ok(frame) => {
                if let Err(error) = send_frame(&mut conn, &frame) {
                    let _ = events.send(EndpointEvent::Disconnected {
                        generation,
                        error: Some(error),
                    });
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => match conn.peer_closed() {
                Ok(false) => {}
                Ok(true) => {
                    let _ = events.send(EndpointEvent::Disconnected {
                        generation,
                        error: None,
                    });
                    return;
                }
                Err(error) => {
                    let _ = events.send(EndpointEvent::Disconnected {
                        generation,
                        error: Some(error),
                    });
                    return;
                }
            },
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn send_frame(conn: &mut ActiveConnection, frame: &[u8]) -> io::Result<()> {
    conn.write_all(frame)?;
    conn.flush()
}
