//! This module handles conversion between iCal text and the values this crate syncs
//!
//! Remote entries are rewritten structurally (see [`lines`]): only the managed properties are touched,
//! everything else is written back byte for byte.

pub mod lines;
mod builder;
pub use builder::build_new;
mod update;
pub use update::{apply_update, validate};
mod parser;
pub use parser::{read_remote, RemoteTodo};

use bitflags::bitflags;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

bitflags! {
    /// The properties this crate is allowed to write. Every other property is opaque.
    pub struct ManagedFields: u8 {
        const SUMMARY = 1;
        const STATUS = 2;
        const DUE = 4;
        const DTSTAMP = 8;
        const LAST_MODIFIED = 16;
    }
}

impl ManagedFields {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SUMMARY" => Some(Self::SUMMARY),
            "STATUS" => Some(Self::STATUS),
            "DUE" => Some(Self::DUE),
            "DTSTAMP" => Some(Self::DTSTAMP),
            "LAST-MODIFIED" => Some(Self::LAST_MODIFIED),
            _ => None,
        }
    }
}

/// Reasons why an entry cannot be rewritten safely
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("missing {0} marker")]
    MissingMarker(&'static str),
    #[error("unbalanced component {0}")]
    Unbalanced(String),
    #[error("expected a single VTODO, found {0}")]
    TodoCount(usize),
    #[error("expected {expected} {name} line(s), found {found}")]
    PropertyCount { name: &'static str, expected: &'static str, found: usize },
}

/// Escape a TEXT value (RFC 5545, section 3.3.11)
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    escaped.push_str("\\n");
                }
            },
            c => escaped.push(c),
        }
    }
    escaped
}

/// Reverse [`escape_text`]
pub fn unescape_text(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => unescaped.push('\n'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Timestamps are always written in UTC (`20260120T093000Z`)
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Due dates are date-only values (`20260120`)
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse a DATE or DATE-TIME value, keeping its date part
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.trim().get(..8)?;
    NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()
}

/// Parse a DATE-TIME value. Floating times are considered to be UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = value.strip_suffix('Z').unwrap_or(value);
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping() {
        assert_eq!(escape_text("a\\b;c,d\ne"), "a\\\\b\\;c\\,d\\ne");
        assert_eq!(escape_text("line\r\nbreak"), "line\\nbreak");
        assert_eq!(unescape_text(&escape_text("Work, Finance; 50% \\ done\nnext")), "Work, Finance; 50% \\ done\nnext");
        assert_eq!(unescape_text("A\\NB"), "A\nB");
    }

    #[test]
    fn dates() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert_eq!(format_date(&date), "20260120");
        assert_eq!(parse_date("20260120"), Some(date));
        assert_eq!(parse_date("20260120T100000Z"), Some(date));
        assert_eq!(parse_date("2026"), None);

        let ts = Utc.with_ymd_and_hms(2026, 1, 20, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "20260120T093000Z");
        assert_eq!(parse_timestamp("20260120T093000Z"), Some(ts));
        assert_eq!(parse_timestamp("20260120T093000"), Some(ts));
        assert_eq!(parse_timestamp("garbage"), None);
    }
}
