//! Tail local log files and forward each new line to a remote syslog
//! collector over UDP, TCP or TLS.
//!
//! [`Agent`] ties the pieces together: glob watchers discover files,
//! tailers turn appended bytes into lines, a [`MessageGenerator`] turns
//! lines into RFC 3164 style packets and an [`Endpoint`] delivers them.

pub mod agent;
pub mod config;
pub mod endpoint;
pub mod framer;
pub mod glob_watch;
pub mod levels;
pub mod message;
pub mod rate_limited_warner;
pub mod tag;
pub mod tailer;

pub use agent::{Agent, AgentError, AgentState};
pub use config::{
    AgentConfig, ConfigError, DestinationConfig, Protocol, SyslogDefaults, TlsConfig, WatchConfig,
};
pub use endpoint::{Destination, Endpoint, EndpointEvent};
pub use framer::LineFramer;
pub use glob_watch::{GlobDiff, GlobWatcher};
pub use levels::{Facility, InvalidLevel, Severity, priority};
pub use message::{FieldPattern, MessageGenerator, SyslogPacket};
pub use tag::{sanitize_tag, tag_for_path};
pub use tailer::{FileTail, TailHandler, TailMode, TailStatus};
