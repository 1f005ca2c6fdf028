//! Destination address with periodic DNS refresh.

use std::{
    io,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, warn};

use super::EndpointEvent;

/// Interval between DNS lookups for a hostname destination.
pub const RESOLVE_INTERVAL: Duration = Duration::from_secs(60);

/// Retry interval while no lookup has succeeded yet.
pub const UNRESOLVED_RETRY: Duration = Duration::from_secs(1);

/// Host and port plus the most recently resolved IP.
///
/// The cached IP is only ever replaced by a newer successful lookup, so
/// a failing resolver keeps using the last good address.
#[derive(Debug)]
pub struct CachedAddress {
    host: String,
    port: u16,
    ip: Option<IpAddr>,
    _refresher: Option<Sender<()>>,
}

impl CachedAddress {
    /// Resolve `host` once and, unless it is an IP literal, keep
    /// refreshing it every `interval` on a background thread. Results
    /// arrive as [`EndpointEvent::Resolved`]. Until a lookup succeeds the
    /// thread retries every [`UNRESOLVED_RETRY`] instead.
    pub fn new(
        host: &str,
        port: u16,
        interval: Duration,
        events: Sender<EndpointEvent>,
    ) -> io::Result<Self> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self {
                host: host.to_string(),
                port,
                ip: Some(ip),
                _refresher: None,
            });
        }

        let ip = match resolve(host, port) {
            Ok(ip) => Some(ip),
            Err(err) => {
                warn!("unable to resolve {host}: {err}");
                None
            }
        };
        let (stop_tx, stop_rx) = bounded(1);
        let owned = host.to_string();
        let resolved = ip.is_some();
        thread::Builder::new()
            .name(format!("resolve-{host}"))
            .spawn(move || refresh_loop(owned, port, interval, resolved, stop_rx, events))?;
        Ok(Self {
            host: host.to_string(),
            port,
            ip,
            _refresher: Some(stop_tx),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    pub fn set_resolved(&mut self, ip: IpAddr) {
        if self.ip != Some(ip) {
            debug!("{} now resolves to {ip}", self.host);
        }
        self.ip = Some(ip);
    }

    /// Cached socket address, if any lookup has succeeded.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip.map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Host to dial: the cached IP, or the configured name when no lookup
    /// has succeeded yet.
    pub fn dial_host(&self) -> String {
        self.ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| self.host.clone())
    }
}

/// Look up `host`, preferring an IPv4 result.
pub fn resolve(host: &str, port: u16) -> io::Result<IpAddr> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(SocketAddr::ip)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {host}"),
            )
        })
}

fn refresh_loop(
    host: String,
    port: u16,
    interval: Duration,
    mut resolved: bool,
    stop: Receiver<()>,
    events: Sender<EndpointEvent>,
) {
    loop {
        let wait = if resolved {
            interval
        } else {
            UNRESOLVED_RETRY.min(interval)
        };
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        match resolve(&host, port) {
            Ok(ip) => {
                resolved = true;
                if events.send(EndpointEvent::Resolved(ip)).is_err() {
                    return;
                }
            }
            Err(err) => debug!("re-resolving {host} failed, keeping previous address: {err}"),
        }
    }
}
