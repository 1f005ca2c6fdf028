//! Warnings emitted through the `log` facade.

use std::{net::TcpListener, time::Duration};

use crossbeam_channel::unbounded;
use logtest::Logger;
use remote_syslog::{Destination, DestinationConfig, Endpoint, Protocol};
use rstest::rstest;
use serial_test::serial;

/// A loopback port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    listener.local_addr().expect("addr").port()
}

#[rstest]
#[serial]
fn queue_overflow_is_reported_once_per_interval() {
    let mut logger = Logger::start();
    let config = DestinationConfig {
        host: "127.0.0.1".into(),
        port: closed_port(),
        protocol: Protocol::Tcp,
        queue_limit: 1,
        connect_timeout: Some(Duration::from_millis(200)),
        ..DestinationConfig::default()
    };
    let (tx, _rx) = unbounded();
    let mut endpoint = Endpoint::new(&config, tx).expect("endpoint");

    for i in 0..5 {
        endpoint.write(format!("message {i}").into_bytes());
    }
    assert_eq!(endpoint.queued(), 1);

    let mut overflow_warnings = Vec::new();
    while let Some(record) = logger.pop() {
        if record.args().contains("send queue full") {
            overflow_warnings.push(record);
        }
    }
    assert_eq!(overflow_warnings.len(), 1);
    assert_eq!(overflow_warnings[0].level(), log::Level::Warn);
    assert!(overflow_warnings[0].args().contains("TCP send queue full; dropped 1 oldest"));
}
