//! Tests for the agent lifecycle.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    net::UdpSocket,
    time::Duration,
};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::config::{Protocol, TlsConfig};

#[fixture]
fn collector() -> UdpSocket {
    let socket = UdpSocket::bind(("127.0.0.1", 0)).expect("bind collector");
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    socket
}

fn config_for(collector: &UdpSocket, dir: &TempDir) -> AgentConfig {
    let port = collector.local_addr().expect("collector addr").port();
    AgentConfig::default()
        .with_destination("127.0.0.1", port)
        .with_hostname("host1")
        .with_path(dir.path().join("*.log").to_string_lossy())
        .with_rescan_interval(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(20))
}

#[rstest]
fn new_rejects_invalid_config() {
    assert!(Agent::new(AgentConfig::default()).is_err());
}

#[rstest]
fn lifecycle_transitions(collector: UdpSocket) {
    let dir = TempDir::new().expect("temp dir");
    let mut agent = Agent::new(config_for(&collector, &dir)).expect("valid config");
    assert_eq!(agent.state(), AgentState::Stopped);

    agent.start().expect("start");
    assert_eq!(agent.state(), AgentState::Running);
    assert!(matches!(agent.start(), Err(AgentError::AlreadyRunning)));

    agent.stop();
    assert_eq!(agent.state(), AgentState::Stopped);
    agent.stop();
    assert_eq!(agent.state(), AgentState::Stopped);

    agent.start().expect("restart");
    assert_eq!(agent.state(), AgentState::Running);
}

#[rstest]
fn start_fails_on_unreadable_certificate(collector: UdpSocket) {
    let dir = TempDir::new().expect("temp dir");
    let config = config_for(&collector, &dir)
        .with_protocol(Protocol::Tls)
        .with_tls(TlsConfig {
            server_cert: Some(dir.path().join("missing.pem")),
            ..TlsConfig::default()
        });
    let mut agent = Agent::new(config).expect("valid config");
    assert!(matches!(
        agent.start(),
        Err(AgentError::Config(ConfigError::Certificate { .. }))
    ));
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[rstest]
fn forwards_appended_lines(collector: UdpSocket) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("app.log");
    fs::write(&path, "existing\n").expect("create log");
    let mut agent = Agent::launch(config_for(&collector, &dir)).expect("launch");

    // Appending until the first datagram arrives covers the window before
    // the first rescan has opened the file.
    let mut buf = [0u8; 2048];
    let mut received = None;
    for _ in 0..50 {
        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(b"hello\n").expect("append");
        collector
            .set_read_timeout(Some(Duration::from_millis(100)))
            .expect("set read timeout");
        if let Ok((n, _)) = collector.recv_from(&mut buf) {
            received = Some(String::from_utf8_lossy(&buf[..n]).into_owned());
            break;
        }
    }
    agent.stop();

    let text = received.expect("datagram received");
    assert!(text.starts_with("<13>"));
    assert!(text.contains(" host1 app.log: "));
    assert!(text.ends_with(": hello"));
}
