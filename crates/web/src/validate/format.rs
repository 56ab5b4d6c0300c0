//! Named format validators.

use std::net::{Ipv4Addr, Ipv6Addr};

/// The recognized `format=` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// RFC 5322 compatible subset.
    Email,
    /// RFC 3339 timestamp.
    DateTime,
    /// `YYYY-MM-DD`.
    Date,
    /// Composite duration such as `2h45m`.
    Duration,
    Ipv4,
    Ipv6,
    /// 8-4-4-4-12 hex.
    Uuid,
    /// Validated by the companion `pattern` rule.
    Regex,
}

impl Format {
    pub fn rule_name(self) -> &'static str {
        match self {
            Format::Email => "format:email",
            Format::DateTime => "format:date-time",
            Format::Date => "format:date",
            Format::Duration => "format:duration",
            Format::Ipv4 => "format:ipv4",
            Format::Ipv6 => "format:ipv6",
            Format::Uuid => "format:uuid",
            Format::Regex => "format:regex",
        }
    }

    /// Parse the tag spelling (`email`, `date-time`, ...).
    pub fn parse(name: &str) -> Option<Format> {
        match name {
            "email" => Some(Format::Email),
            "date-time" | "datetime" => Some(Format::DateTime),
            "date" => Some(Format::Date),
            "duration" => Some(Format::Duration),
            "ipv4" => Some(Format::Ipv4),
            "ipv6" => Some(Format::Ipv6),
            "uuid" => Some(Format::Uuid),
            "regex" => Some(Format::Regex),
            _ => None,
        }
    }
}

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$";
const UUID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

pub(crate) fn check(format: Format, text: &str) -> Result<(), String> {
    match format {
        Format::Email => {
            let re = regex::Regex::new(EMAIL_PATTERN).expect("email pattern compiles");
            if re.is_match(text) {
                Ok(())
            } else {
                Err("invalid email format".to_string())
            }
        }
        Format::DateTime => chrono::DateTime::parse_from_rfc3339(text)
            .map(|_| ())
            .map_err(|_| format!("{text:?} is not an RFC 3339 date-time")),
        Format::Date => chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| format!("{text:?} is not a YYYY-MM-DD date")),
        Format::Duration => humantime::parse_duration(text)
            .map(|_| ())
            .map_err(|_| format!("{text:?} is not a valid duration")),
        Format::Ipv4 => text
            .parse::<Ipv4Addr>()
            .map(|_| ())
            .map_err(|_| format!("{text:?} is not an IPv4 address")),
        Format::Ipv6 => text
            .parse::<Ipv6Addr>()
            .map(|_| ())
            .map_err(|_| format!("{text:?} is not an IPv6 address")),
        Format::Uuid => {
            let re = regex::Regex::new(UUID_PATTERN).expect("uuid pattern compiles");
            if re.is_match(text) {
                Ok(())
            } else {
                Err(format!("{text:?} is not a UUID"))
            }
        }
        // the companion pattern rule does the matching
        Format::Regex => Ok(()),
    }
}
