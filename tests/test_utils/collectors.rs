//! Loopback syslog collectors for end-to-end tests.
//!
//! Both collectors expose `next(timeout)` returning the next received
//! message as text, so tests can drive UDP and TCP agents the same way.

use std::{
    io::{BufRead, BufReader},
    net::{TcpListener, UdpSocket},
    sync::mpsc::{self, Receiver},
    thread,
    time::Duration,
};

/// Bound UDP socket receiving one packet per message.
pub struct UdpCollector {
    socket: UdpSocket,
}

impl UdpCollector {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).expect("bind UDP collector");
        Self { socket }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().expect("collector addr").port()
    }

    pub fn next(&self, timeout: Duration) -> Option<String> {
        self.socket
            .set_read_timeout(Some(timeout))
            .expect("set read timeout");
        let mut buf = [0u8; 65_536];
        let (n, _) = self.socket.recv_from(&mut buf).ok()?;
        Some(String::from_utf8_lossy(&buf[..n]).into_owned())
    }
}

/// TCP listener forwarding every newline-terminated line it receives,
/// across any number of connections.
pub struct LineCollector {
    port: u16,
    lines: Receiver<String>,
}

impl LineCollector {
    pub fn bind() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind TCP collector");
        let port = listener.local_addr().expect("collector addr").port();
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    return;
                };
                let tx = tx.clone();
                thread::spawn(move || {
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else {
                            return;
                        };
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                });
            }
        });
        Self { port, lines }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn next(&self, timeout: Duration) -> Option<String> {
        self.lines.recv_timeout(timeout).ok()
    }
}
