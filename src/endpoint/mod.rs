//! Destination endpoints.
//!
//! [`Endpoint`] is a closed set of transports selected once from
//! [`DestinationConfig`]. All variants accept packets through
//! [`Destination::write`], which never blocks and never fails; transient
//! connectivity problems are handled inside the endpoint and reported
//! through the log.
//!
//! Background threads (DNS refresh, stream sessions) report back through
//! [`EndpointEvent`]s which the owner feeds to [`Endpoint::handle_event`]
//! on the thread that owns the endpoint.

mod address;
mod send_queue;
mod stream;
mod transport;
mod udp;


use std::{
    io,
    net::IpAddr,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;

use crate::config::{ConfigError, DestinationConfig, Protocol};

pub use address::{CachedAddress, RESOLVE_INTERVAL, resolve};
pub use send_queue::SendQueue;
pub use stream::{RECONNECT_DELAY, StreamEndpoint, frame_payload};
pub use transport::{ActiveConnection, ConnectSpec, TlsOptions, connect_transport};
pub use udp::UdpEndpoint;

/// Sink for assembled syslog packets.
pub trait Destination {
    fn write(&mut self, packet: Vec<u8>);
}

/// Completion notices from endpoint background threads.
#[derive(Debug)]
pub enum EndpointEvent {
    Resolved(IpAddr),
    /// The session is ready for writes (after the TLS handshake when
    /// TLS is in use).
    Connected { generation: u64 },
    ConnectFailed { generation: u64, error: io::Error },
    /// `None` means the peer closed the connection cleanly.
    Disconnected {
        generation: u64,
        error: Option<io::Error>,
    },
}

#[derive(Debug)]
pub enum Endpoint {
    Udp(UdpEndpoint),
    Tcp(StreamEndpoint),
    Tls(StreamEndpoint),
}

impl Endpoint {
    /// Build the endpoint described by `config`.
    ///
    /// Only configuration problems such as unreadable certificates fail
    /// here; an unreachable collector is retried in the background.
    pub fn new(
        config: &DestinationConfig,
        events: Sender<EndpointEvent>,
    ) -> Result<Self, ConfigError> {
        Self::with_resolve_interval(config, events, RESOLVE_INTERVAL)
    }

    pub fn with_resolve_interval(
        config: &DestinationConfig,
        events: Sender<EndpointEvent>,
        resolve_interval: Duration,
    ) -> Result<Self, ConfigError> {
        let tls = match config.protocol {
            Protocol::Tls => Some(TlsOptions::from_config(&config.host, &config.tls)?),
            _ => None,
        };
        let address = CachedAddress::new(&config.host, config.port, resolve_interval, events.clone())
            .map_err(|source| ConfigError::Invalid(format!("unable to start resolver: {source}")))?;
        let spec = ConnectSpec {
            port: config.port,
            connect_timeout: config.connect_timeout,
            tls,
        };
        Ok(match config.protocol {
            Protocol::Udp => Endpoint::Udp(UdpEndpoint::new(address)),
            Protocol::Tcp => Endpoint::Tcp(StreamEndpoint::new(
                Protocol::Tcp,
                address,
                spec,
                config.queue_limit,
                events,
            )),
            Protocol::Tls => Endpoint::Tls(StreamEndpoint::new(
                Protocol::Tls,
                address,
                spec,
                config.queue_limit,
                events,
            )),
        })
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Endpoint::Udp(_) => Protocol::Udp,
            Endpoint::Tcp(_) => Protocol::Tcp,
            Endpoint::Tls(_) => Protocol::Tls,
        }
    }

    /// UDP endpoints are always considered connected.
    pub fn is_connected(&self) -> bool {
        match self {
            Endpoint::Udp(_) => true,
            Endpoint::Tcp(stream) | Endpoint::Tls(stream) => stream.is_connected(),
        }
    }

    pub fn queued(&self) -> usize {
        match self {
            Endpoint::Udp(_) => 0,
            Endpoint::Tcp(stream) | Endpoint::Tls(stream) => stream.queued(),
        }
    }

    pub fn handle_event(&mut self, event: EndpointEvent, now: Instant) {
        match self {
            Endpoint::Udp(udp) => match event {
                EndpointEvent::Resolved(ip) => udp.set_resolved(ip),
                other => log::debug!("UDP endpoint ignoring {other:?}"),
            },
            Endpoint::Tcp(stream) | Endpoint::Tls(stream) => stream.handle_event(event, now),
        }
    }

    pub fn on_tick(&mut self, now: Instant) {
        if let Endpoint::Tcp(stream) | Endpoint::Tls(stream) = self {
            stream.on_tick(now);
        }
    }

    /// Earliest instant at which [`Endpoint::on_tick`] has work to do.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        match self {
            Endpoint::Udp(_) => None,
            Endpoint::Tcp(stream) | Endpoint::Tls(stream) => stream.next_deadline(now),
        }
    }
}

impl Destination for Endpoint {
    fn write(&mut self, packet: Vec<u8>) {
        match self {
            Endpoint::Udp(udp) => udp.write(&packet),
            Endpoint::Tcp(stream) | Endpoint::Tls(stream) => stream.write(packet),
        }
    }
}
