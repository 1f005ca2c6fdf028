//! BSD-style syslog packet assembly.

use chrono::{DateTime, TimeZone};

use crate::levels::{self, Facility, Severity};

/// One syslog message prior to serialisation.
#[derive(Clone, Debug)]
pub struct SyslogPacket<Tz: TimeZone> {
    pub facility: Facility,
    pub severity: Severity,
    pub time: DateTime<Tz>,
    pub hostname: String,
    pub tag: String,
    pub content: String,
}

impl<Tz: TimeZone> SyslogPacket<Tz>
where
    Tz::Offset: std::fmt::Display,
{
    pub fn pri(&self) -> u8 {
        levels::priority(self.facility, self.severity)
    }

    /// `<PRI>TIMESTAMP HOSTNAME TAG: ` prefix shared by every transport.
    pub fn header(&self) -> String {
        format!(
            "<{}>{} {} {}: ",
            self.pri(),
            format_timestamp(&self.time),
            self.hostname,
            self.tag
        )
    }

    /// Serialise the packet, cutting the content so the result fits in
    /// `max_size` bytes. The header is only cut when it alone exceeds the
    /// limit.
    pub fn assemble(&self, max_size: usize) -> Vec<u8> {
        let mut data = self.header();
        let budget = max_size.saturating_sub(data.len());
        data.push_str(truncate_str(&self.content, budget));
        let cut = truncate_str(&data, max_size).len();
        data.truncate(cut);
        data.into_bytes()
    }
}

/// Format as `Mon dd HH:MM:SS` with a space-padded day.
pub fn format_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%b %e %H:%M:%S").to_string()
}

fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
