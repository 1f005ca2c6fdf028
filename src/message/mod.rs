//! Turns tailed lines into syslog packets.
//!
//! [`MessageGenerator`] applies the per-line pipeline in a fixed order:
//! exclusion, colour stripping, prefixing, field extraction, tag
//! fallback, assembly and truncation. The finished bytes go to the
//! [`Destination`] it owns.

mod fields;
mod packet;


use std::borrow::Cow;

use chrono::{DateTime, Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{config::SyslogDefaults, endpoint::Destination, tag::sanitize_tag};

pub use fields::{ExtractedFields, FieldPattern};
pub use packet::{SyslogPacket, format_timestamp};

static ANSI_SGR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[(?:(?:[0-9]{1,3});){0,2}(?:[0-9]{1,3})m").expect("colour pattern is valid")
});

/// Remove ANSI SGR colour sequences such as `ESC[1;31m`.
pub fn strip_color(line: &str) -> Cow<'_, str> {
    ANSI_SGR.replace_all(line, "")
}

/// Short name of this machine: the host name up to its first dot, or
/// `localhost` when it cannot be determined.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| {
            let name = name.to_string_lossy();
            name.split('.')
                .next()
                .filter(|short| !short.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// Formats lines and writes them to a destination.
#[derive(Debug)]
pub struct MessageGenerator<D> {
    defaults: SyslogDefaults,
    hostname: String,
    max_size: usize,
    destination: D,
}

impl<D: Destination> MessageGenerator<D> {
    pub fn new(defaults: SyslogDefaults, max_size: usize, destination: D) -> Self {
        let hostname = defaults
            .hostname
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(local_hostname);
        Self {
            defaults,
            hostname,
            max_size,
            destination,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }

    /// Format `line` from the source tagged `tag` and write it.
    /// Returns `false` when the line was excluded.
    pub fn transmit(&mut self, tag: &str, line: &str) -> bool {
        self.transmit_at(tag, line, Local::now())
    }

    pub fn transmit_at<Tz: TimeZone>(&mut self, tag: &str, line: &str, time: DateTime<Tz>) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        let Some(packet) = self.packet(tag, line, time) else {
            return false;
        };
        let bytes = packet.assemble(self.max_size);
        self.destination.write(bytes);
        true
    }

    /// Build the packet for `line`, or `None` if it is excluded.
    pub fn packet<Tz: TimeZone>(
        &self,
        tag: &str,
        line: &str,
        time: DateTime<Tz>,
    ) -> Option<SyslogPacket<Tz>>
    where
        Tz::Offset: std::fmt::Display,
    {
        if self
            .defaults
            .exclude_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(line))
        {
            return None;
        }

        let mut content: Cow<'_, str> = Cow::Borrowed(line);
        if self.defaults.strip_color {
            content = Cow::Owned(strip_color(&content).into_owned());
        }
        if let Some(prefix) = &self.defaults.prepend {
            content = Cow::Owned(format!("{prefix}{content}"));
        }

        let mut hostname = self.hostname.clone();
        let mut packet_tag = None;
        if let Some(fields) = self
            .defaults
            .field_pattern
            .as_ref()
            .and_then(|pattern| pattern.extract(&content))
        {
            if let Some(host) = fields.hostname {
                hostname = host.to_string();
            }
            packet_tag = fields.tag.map(sanitize_tag);
            if let Some(body) = fields.content {
                content = Cow::Owned(body.to_string());
            }
        }

        Some(SyslogPacket {
            facility: self.defaults.facility,
            severity: self.defaults.severity,
            time,
            hostname,
            tag: packet_tag.unwrap_or_else(|| tag.to_string()),
            content: content.into_owned(),
        })
    }
}
