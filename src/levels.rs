//! Syslog severity and facility codes.
//!
//! Both tables are closed enums with `FromStr` implementations so
//! configuration values are validated once at startup. Names follow the
//! BSD syslog conventions; decimal codes inside the valid range are also
//! accepted.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Highest valid priority value (`local7.debug`).
pub const MAX_PRIORITY: u8 = 191;

/// A facility or severity name that does not map to a syslog code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value} (valid: {valid})")]
pub struct InvalidLevel {
    pub kind: &'static str,
    pub value: String,
    pub valid: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    #[default]
    Notice,
    Info,
    Debug,
}

impl Severity {
    pub const ALL: [Severity; 8] = [
        Severity::Emerg,
        Severity::Alert,
        Severity::Crit,
        Severity::Err,
        Severity::Warning,
        Severity::Notice,
        Severity::Info,
        Severity::Debug,
    ];

    /// Numeric syslog code (0–7).
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Emerg => "emerg",
            Severity::Alert => "alert",
            Severity::Crit => "crit",
            Severity::Err => "err",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = InvalidLevel;

    fn from_str(s: &str) -> Result<Self, InvalidLevel> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(code) = normalized.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| invalid_severity(s));
        }
        match normalized.as_str() {
            "emerg" | "emergency" | "panic" => Ok(Self::Emerg),
            "alert" => Ok(Self::Alert),
            "crit" | "critical" => Ok(Self::Crit),
            "err" | "error" => Ok(Severity::Err),
            "warning" | "warn" => Ok(Self::Warning),
            "notice" => Ok(Self::Notice),
            "info" | "informational" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            _ => Err(invalid_severity(s)),
        }
    }
}

fn invalid_severity(value: &str) -> InvalidLevel {
    InvalidLevel {
        kind: "severity",
        value: value.to_string(),
        valid: join_names(Severity::ALL.iter().map(|s| s.as_str())),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facility {
    Kern,
    #[default]
    User,
    Mail,
    Daemon,
    Auth,
    Syslog,
    Lpr,
    News,
    Uucp,
    Cron,
    Authpriv,
    Ftp,
    Local0,
    Local1,
    Local2,
    Local3,
    Local4,
    Local5,
    Local6,
    Local7,
}

impl Facility {
    pub const ALL: [Facility; 20] = [
        Facility::Kern,
        Facility::User,
        Facility::Mail,
        Facility::Daemon,
        Facility::Auth,
        Facility::Syslog,
        Facility::Lpr,
        Facility::News,
        Facility::Uucp,
        Facility::Cron,
        Facility::Authpriv,
        Facility::Ftp,
        Facility::Local0,
        Facility::Local1,
        Facility::Local2,
        Facility::Local3,
        Facility::Local4,
        Facility::Local5,
        Facility::Local6,
        Facility::Local7,
    ];

    /// Numeric syslog code (0–23). Codes 12–15 are reserved and have no
    /// named variant.
    pub fn code(self) -> u8 {
        match self {
            Facility::Kern => 0,
            Facility::User => 1,
            Facility::Mail => 2,
            Facility::Daemon => 3,
            Facility::Auth => 4,
            Facility::Syslog => 5,
            Facility::Lpr => 6,
            Facility::News => 7,
            Facility::Uucp => 8,
            Facility::Cron => 9,
            Facility::Authpriv => 10,
            Facility::Ftp => 11,
            Facility::Local0 => 16,
            Facility::Local1 => 17,
            Facility::Local2 => 18,
            Facility::Local3 => 19,
            Facility::Local4 => 20,
            Facility::Local5 => 21,
            Facility::Local6 => 22,
            Facility::Local7 => 23,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Facility::Kern => "kern",
            Facility::User => "user",
            Facility::Mail => "mail",
            Facility::Daemon => "daemon",
            Facility::Auth => "auth",
            Facility::Syslog => "syslog",
            Facility::Lpr => "lpr",
            Facility::News => "news",
            Facility::Uucp => "uucp",
            Facility::Cron => "cron",
            Facility::Authpriv => "authpriv",
            Facility::Ftp => "ftp",
            Facility::Local0 => "local0",
            Facility::Local1 => "local1",
            Facility::Local2 => "local2",
            Facility::Local3 => "local3",
            Facility::Local4 => "local4",
            Facility::Local5 => "local5",
            Facility::Local6 => "local6",
            Facility::Local7 => "local7",
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.code() == code)
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facility {
    type Err = InvalidLevel;

    fn from_str(s: &str) -> Result<Self, InvalidLevel> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(code) = normalized.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| invalid_facility(s));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| invalid_facility(s))
    }
}

fn invalid_facility(value: &str) -> InvalidLevel {
    InvalidLevel {
        kind: "facility",
        value: value.to_string(),
        valid: join_names(Facility::ALL.iter().map(|f| f.as_str())),
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Combine a facility and severity into the `PRI` header value.
pub fn priority(facility: Facility, severity: Severity) -> u8 {
    facility.code() * 8 + severity.code()
}
