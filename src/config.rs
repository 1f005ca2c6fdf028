//! Agent configuration.
//!
//! [`AgentConfig`] is assembled from defaults, an optional INI file and
//! command-line overrides, then validated once before the agent starts.
//! Invalid values are reported as [`ConfigError`]; absent values keep
//! their defaults.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use ini::{Ini, ParseOption, Properties};
use regex::Regex;
use thiserror::Error;

use crate::{
    levels::{Facility, InvalidLevel, Severity},
    message::FieldPattern,
    tailer::TailMode,
};

/// Standard syslog port.
pub const DEFAULT_PORT: u16 = 514;
/// Maximum number of frames held while a stream endpoint is disconnected.
pub const DEFAULT_QUEUE_LIMIT: usize = 10_000;
/// Interval between glob expansions.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(10);
/// Interval between reads of a tailed file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub const UDP_MAX_MESSAGE_SIZE: usize = 1024;
pub const TLS_MAX_MESSAGE_SIZE: usize = 10240;
pub const TCP_MAX_MESSAGE_SIZE: usize = 20480;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration file: {0}")]
    Parse(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Level(#[from] InvalidLevel),
    #[error("invalid {key} pattern: {source}")]
    Pattern {
        key: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("invalid glob {pattern:?}: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("failed to read TLS {kind} {path}: {source}")]
    Certificate {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Transport used to reach the collector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl Protocol {
    /// Human-readable mode for startup logging.
    pub fn label(self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
            Protocol::Tls => "TCP/TLS",
        }
    }

    pub fn default_max_message_size(self) -> usize {
        match self {
            Protocol::Udp => UDP_MAX_MESSAGE_SIZE,
            Protocol::Tcp => TCP_MAX_MESSAGE_SIZE,
            Protocol::Tls => TLS_MAX_MESSAGE_SIZE,
        }
    }

    pub fn is_stream(self) -> bool {
        !matches!(self, Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            "tls" | "tcp+tls" | "tcp/tls" => Ok(Protocol::Tls),
            _ => Err(ConfigError::InvalidValue {
                key: "protocol",
                value: s.to_string(),
            }),
        }
    }
}

/// PEM files used by the TLS transport.
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    pub client_cert_chain: Option<PathBuf>,
    pub client_private_key: Option<PathBuf>,
    /// When set, the only certificate trusted for the server.
    pub server_cert: Option<PathBuf>,
}

/// Where and how syslog packets are delivered.
#[derive(Clone, Debug)]
pub struct DestinationConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub queue_limit: usize,
    pub max_message_size: Option<usize>,
    /// Upper bound on TCP connect; `None` leaves it to the OS.
    pub connect_timeout: Option<Duration>,
    pub tls: TlsConfig,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            protocol: Protocol::default(),
            queue_limit: DEFAULT_QUEUE_LIMIT,
            max_message_size: None,
            connect_timeout: None,
            tls: TlsConfig::default(),
        }
    }
}

impl DestinationConfig {
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
            .unwrap_or_else(|| self.protocol.default_max_message_size())
    }
}

/// Values applied to every generated syslog packet.
#[derive(Clone, Debug, Default)]
pub struct SyslogDefaults {
    pub facility: Facility,
    pub severity: Severity,
    /// Overrides the local short hostname.
    pub hostname: Option<String>,
    pub field_pattern: Option<FieldPattern>,
    pub strip_color: bool,
    pub prepend: Option<String>,
    /// Lines matching this pattern are never sent.
    pub exclude_pattern: Option<Regex>,
}

/// Files to tail.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Plain paths or glob patterns.
    pub paths: Vec<String>,
    /// Discovered files whose path matches this pattern are ignored.
    pub exclude_files: Option<Regex>,
    pub rescan_interval: Duration,
    pub poll_interval: Duration,
    pub mode: TailMode,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            exclude_files: None,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            mode: TailMode::default(),
        }
    }
}

/// Complete agent configuration.
#[derive(Clone, Debug, Default)]
pub struct AgentConfig {
    pub destination: DestinationConfig,
    pub syslog: SyslogDefaults,
    pub watch: WatchConfig,
}

impl AgentConfig {
    pub fn with_destination(mut self, host: impl Into<String>, port: u16) -> Self {
        self.destination.host = host.into();
        self.destination.port = port;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.destination.protocol = protocol;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.destination.tls = tls;
        self
    }

    pub fn with_queue_limit(mut self, limit: usize) -> Self {
        self.destination.queue_limit = limit;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.destination.max_message_size = Some(size);
        self
    }

    pub fn with_facility(mut self, facility: Facility) -> Self {
        self.syslog.facility = facility;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.syslog.severity = severity;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.syslog.hostname = Some(hostname.into());
        self
    }

    pub fn with_field_pattern(mut self, pattern: FieldPattern) -> Self {
        self.syslog.field_pattern = Some(pattern);
        self
    }

    pub fn with_strip_color(mut self, strip: bool) -> Self {
        self.syslog.strip_color = strip;
        self
    }

    pub fn with_prepend(mut self, prepend: impl Into<String>) -> Self {
        self.syslog.prepend = Some(prepend.into());
        self
    }

    pub fn with_exclude_pattern(mut self, pattern: Regex) -> Self {
        self.syslog.exclude_pattern = Some(pattern);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.watch.paths.push(path.into());
        self
    }

    pub fn with_exclude_files(mut self, pattern: Regex) -> Self {
        self.watch.exclude_files = Some(pattern);
        self
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.watch.rescan_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.watch.poll_interval = interval;
        self
    }

    pub fn with_tail_mode(mut self, mode: TailMode) -> Self {
        self.watch.mode = mode;
        self
    }

    /// Check cross-field constraints that the types alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dest = &self.destination;
        if dest.host.trim().is_empty() {
            return Err(ConfigError::Invalid("destination host must not be empty".into()));
        }
        if dest.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "port",
                value: "0".into(),
            });
        }
        if dest.queue_limit == 0 {
            return Err(ConfigError::Invalid("queue limit must be positive".into()));
        }
        if dest.max_message_size() == 0 {
            return Err(ConfigError::Invalid(
                "max message size must be positive".into(),
            ));
        }
        if dest.tls.client_cert_chain.is_some() != dest.tls.client_private_key.is_some() {
            return Err(ConfigError::Invalid(
                "client certificate chain and private key must be set together".into(),
            ));
        }
        if self.watch.paths.is_empty() {
            return Err(ConfigError::Invalid("no files to watch".into()));
        }
        for pattern in &self.watch.paths {
            glob::Pattern::new(pattern).map_err(|source| ConfigError::Glob {
                pattern: pattern.clone(),
                source,
            })?;
        }
        if self.watch.rescan_interval.is_zero() || self.watch.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("intervals must be positive".into()));
        }
        Ok(())
    }

    /// Load configuration from an INI file.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Parse configuration from INI text.
    ///
    /// Recognised sections are `[destination]`, `[tls]`, `[syslog]` and
    /// `[files]`. Each `path =` line under `[files]` adds a watch target.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        // Backslashes are kept verbatim so regular expressions survive.
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options)
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        let mut config = AgentConfig::default();
        if let Some(section) = ini.section(Some("destination")) {
            apply_destination(&mut config.destination, section)?;
        }
        if let Some(section) = ini.section(Some("tls")) {
            apply_tls(&mut config.destination.tls, section);
        }
        if let Some(section) = ini.section(Some("syslog")) {
            apply_syslog(&mut config.syslog, section)?;
        }
        if let Some(section) = ini.section(Some("files")) {
            apply_files(&mut config.watch, section)?;
        }
        Ok(config)
    }
}

fn value<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_number(key, raw)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_regex(key: &'static str, raw: &str) -> Result<Regex, ConfigError> {
    Regex::new(raw).map_err(|source| ConfigError::Pattern { key, source })
}

fn apply_destination(dest: &mut DestinationConfig, section: &Properties) -> Result<(), ConfigError> {
    if let Some(host) = value(section, "host") {
        dest.host = host.to_string();
    }
    if let Some(port) = value(section, "port") {
        dest.port = parse_number("port", port)?;
    }
    if let Some(protocol) = value(section, "protocol") {
        dest.protocol = protocol.parse()?;
    }
    if let Some(limit) = value(section, "queue_limit") {
        dest.queue_limit = parse_number("queue_limit", limit)?;
    }
    if let Some(size) = value(section, "max_message_size") {
        dest.max_message_size = Some(parse_number("max_message_size", size)?);
    }
    if let Some(timeout) = value(section, "connect_timeout") {
        dest.connect_timeout = Some(parse_seconds("connect_timeout", timeout)?);
    }
    Ok(())
}

fn apply_tls(tls: &mut TlsConfig, section: &Properties) {
    let path = |key| value(section, key).map(PathBuf::from);
    tls.client_cert_chain = path("client_cert_chain").or(tls.client_cert_chain.take());
    tls.client_private_key = path("client_private_key").or(tls.client_private_key.take());
    tls.server_cert = path("server_cert").or(tls.server_cert.take());
}

fn apply_syslog(syslog: &mut SyslogDefaults, section: &Properties) -> Result<(), ConfigError> {
    if let Some(facility) = value(section, "facility") {
        syslog.facility = facility.parse()?;
    }
    if let Some(severity) = value(section, "severity") {
        syslog.severity = severity.parse()?;
    }
    if let Some(hostname) = value(section, "hostname") {
        syslog.hostname = Some(hostname.to_string());
    }
    if let Some(selector) = value(section, "parse_fields") {
        syslog.field_pattern = Some(
            FieldPattern::parse(selector).map_err(|source| ConfigError::Pattern {
                key: "parse_fields",
                source,
            })?,
        );
    }
    if let Some(strip) = value(section, "strip_color") {
        syslog.strip_color = parse_bool("strip_color", strip)?;
    }
    // Leading and trailing spaces are significant in a prefix.
    if let Some(prepend) = section.get("prepend").filter(|p| !p.is_empty()) {
        syslog.prepend = Some(prepend.to_string());
    }
    if let Some(pattern) = value(section, "exclude_pattern") {
        syslog.exclude_pattern = Some(parse_regex("exclude_pattern", pattern)?);
    }
    Ok(())
}

fn apply_files(watch: &mut WatchConfig, section: &Properties) -> Result<(), ConfigError> {
    watch.paths.extend(
        section
            .get_all("path")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from),
    );
    if let Some(pattern) = value(section, "exclude_files") {
        watch.exclude_files = Some(parse_regex("exclude_files", pattern)?);
    }
    if let Some(interval) = value(section, "rescan_interval") {
        watch.rescan_interval = parse_seconds("rescan_interval", interval)?;
    }
    if let Some(interval) = value(section, "poll_interval") {
        watch.poll_interval = parse_seconds("poll_interval", interval)?;
    }
    if let Some(mode) = value(section, "mode") {
        watch.mode = mode.parse().map_err(|_| ConfigError::InvalidValue {
            key: "mode",
            value: mode.to_string(),
        })?;
    }
    Ok(())
}
