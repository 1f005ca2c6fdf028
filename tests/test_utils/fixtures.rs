//! Fixtures shared by the agent integration tests.

use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
    time::{Duration, Instant},
};

use remote_syslog::AgentConfig;
use rstest::fixture;
use tempfile::TempDir;

/// Line appended by [`prime`] until the agent has started tailing.
pub const WARMUP: &str = "warmup";

/// Directory holding the files a test agent tails.
#[fixture]
pub fn log_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}

/// Configuration sending to `127.0.0.1:port` as `host1` with fast timers.
pub fn agent_config(port: u16, pattern: &Path) -> AgentConfig {
    AgentConfig::default()
        .with_destination("127.0.0.1", port)
        .with_hostname("host1")
        .with_path(pattern.to_string_lossy())
        .with_rescan_interval(Duration::from_millis(50))
        .with_poll_interval(Duration::from_millis(10))
}

pub fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open log for append");
    file.write_all(text.as_bytes()).expect("append to log");
}

/// Append warm-up lines to `path` until one is received, then drain the
/// warm-up lines still in flight.
///
/// Tailers start at the end of a file, so anything written before the
/// agent discovers it is never sent.
pub fn prime(path: &Path, mut next: impl FnMut(Duration) -> Option<String>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        assert!(Instant::now() < deadline, "agent never tailed {}", path.display());
        append(path, &format!("{WARMUP}\n"));
        if next(Duration::from_millis(100)).is_some() {
            break;
        }
    }
    while let Some(message) = next(Duration::from_millis(300)) {
        assert!(message.ends_with(&format!(": {WARMUP}")), "unexpected {message:?}");
    }
}
