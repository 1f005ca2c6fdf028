//! Fire-and-forget datagram endpoint.

use std::{
    io,
    net::{IpAddr, SocketAddr, UdpSocket},
};

use log::warn;

use crate::rate_limited_warner::RateLimitedWarner;

use super::address::CachedAddress;

/// Sends one datagram per message to the cached destination address.
#[derive(Debug)]
pub struct UdpEndpoint {
    address: CachedAddress,
    socket: Option<UdpSocket>,
    warner: RateLimitedWarner,
}

impl UdpEndpoint {
    pub fn new(address: CachedAddress) -> Self {
        Self {
            address,
            socket: None,
            warner: RateLimitedWarner::default(),
        }
    }

    pub fn address(&self) -> &CachedAddress {
        &self.address
    }

    pub fn set_resolved(&mut self, ip: IpAddr) {
        self.address.set_resolved(ip);
    }

    pub fn write(&mut self, packet: &[u8]) {
        if let Err(err) = self.send(packet) {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                warn!(
                    "UDP send to {}:{} failed: {err}; dropped {count} messages",
                    self.address.host(),
                    self.address.port()
                );
            });
        }
    }

    /// Messages written before the first successful lookup are dropped;
    /// resolution only happens on the refresh thread.
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let target = self.address.socket_addr().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "destination not resolved yet")
        })?;
        let socket = self.socket_for(&target)?;
        socket.send_to(packet, target)?;
        Ok(())
    }

    fn socket_for(&mut self, target: &SocketAddr) -> io::Result<&UdpSocket> {
        let reusable = self
            .socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .is_some_and(|local| local.is_ipv4() == target.is_ipv4());
        if !reusable {
            let bind: SocketAddr = if target.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            let socket = UdpSocket::bind(bind)?;
            socket.set_nonblocking(true)?;
            self.socket = Some(socket);
        }
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::other("socket unavailable"))
    }
}
