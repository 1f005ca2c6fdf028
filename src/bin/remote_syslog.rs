//! Foreground daemon: tail files and forward new lines to syslog.
//!
//! ```bash
//! remote_syslog --dest-host logs.example.com --dest-port 514 /var/log/app/*.log
//! remote_syslog --config /etc/remote_syslog.ini
//! ```

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};

use remote_syslog::{
    Agent, AgentConfig, ConfigError, Facility, FieldPattern, Protocol, Severity,
};

/// Tail log files and forward each new line to a remote syslog collector.
#[derive(Parser, Debug)]
#[command(name = "remote_syslog", version, about, long_about = None)]
struct Cli {
    /// INI configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Destination syslog hostname or IP
    #[arg(short, long)]
    dest_host: Option<String>,

    /// Destination syslog port
    #[arg(short = 'p', long)]
    dest_port: Option<u16>,

    /// Transport: udp, tcp or tls
    #[arg(long)]
    protocol: Option<Protocol>,

    /// Shorthand for `--protocol tls`
    #[arg(long, conflicts_with = "protocol")]
    tls: bool,

    /// Syslog facility name or code
    #[arg(short, long)]
    facility: Option<Facility>,

    /// Syslog severity name or code
    #[arg(short, long)]
    severity: Option<Severity>,

    /// Hostname to send from
    #[arg(long)]
    hostname: Option<String>,

    /// Take hostname and tag from syslog-formatted lines
    #[arg(long)]
    parse_syslog: bool,

    /// Remove ANSI colour codes before sending
    #[arg(long)]
    strip_color: bool,

    /// Files or glob patterns to tail
    files: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Result<AgentConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_ini_file(path)?,
            None => AgentConfig::default(),
        };
        if let Some(host) = self.dest_host {
            config.destination.host = host;
        }
        if let Some(port) = self.dest_port {
            config.destination.port = port;
        }
        if self.tls {
            config = config.with_protocol(Protocol::Tls);
        } else if let Some(protocol) = self.protocol {
            config = config.with_protocol(protocol);
        }
        if let Some(facility) = self.facility {
            config = config.with_facility(facility);
        }
        if let Some(severity) = self.severity {
            config = config.with_severity(severity);
        }
        if let Some(hostname) = self.hostname {
            config = config.with_hostname(hostname);
        }
        if self.parse_syslog {
            config = config.with_field_pattern(FieldPattern::Syslog);
        }
        if self.strip_color {
            config = config.with_strip_color(true);
        }
        for file in self.files {
            config = config.with_path(file);
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(2);
        }
    };
    let mut agent = match Agent::launch(config) {
        Ok(agent) => agent,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let (stop_tx, stop_rx) = bounded(1);
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    }) {
        error!("failed to install signal handler: {err}");
        agent.stop();
        return ExitCode::FAILURE;
    }
    let _ = stop_rx.recv();
    info!("shutting down");
    agent.stop();
    ExitCode::SUCCESS
}
