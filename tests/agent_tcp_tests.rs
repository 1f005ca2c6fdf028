//! End-to-end forwarding over TCP.

mod test_utils;

use std::time::Duration;

use remote_syslog::{Agent, AgentState, Protocol, TailMode};
use rstest::rstest;
use tempfile::TempDir;

use test_utils::{LineCollector, agent_config, append, log_dir, prime};

const WAIT: Duration = Duration::from_secs(5);

#[rstest]
#[case::reactor(TailMode::Reactor)]
#[case::threaded(TailMode::Threaded)]
fn lines_arrive_newline_framed_in_order(log_dir: TempDir, #[case] mode: TailMode) {
    let collector = LineCollector::bind();
    let path = log_dir.path().join("app.log");
    let config = agent_config(collector.port(), &path)
        .with_protocol(Protocol::Tcp)
        .with_tail_mode(mode);
    let mut agent = Agent::launch(config).expect("launch agent");

    prime(&path, |t| collector.next(t));
    let body: String = (0..100).map(|i| format!("line {i}\n")).collect();
    append(&path, &body);

    for i in 0..100 {
        let line = collector.next(WAIT).expect("line received");
        assert!(line.starts_with("<13>"), "{line:?}");
        assert!(line.ends_with(&format!("host1 app.log: line {i}")), "{line:?}");
    }

    agent.stop();
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[rstest]
fn lines_larger_than_a_datagram_are_kept_whole(log_dir: TempDir) {
    let collector = LineCollector::bind();
    let path = log_dir.path().join("app.log");
    let config = agent_config(collector.port(), &path).with_protocol(Protocol::Tcp);
    let _agent = Agent::launch(config).expect("launch agent");

    prime(&path, |t| collector.next(t));
    let long = "w".repeat(5000);
    append(&path, &format!("{long}\n"));
    let line = collector.next(WAIT).expect("line received");
    assert!(line.ends_with(&long));
}
