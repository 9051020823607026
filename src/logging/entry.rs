//! Log entries and the day-file line format
//!
//! The first physical line of every entry looks like
//! `2026-01-21 14:30:45 | I | message`. Multi-line messages continue on
//! following physical lines verbatim.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// chrono format of the leading timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of the rendered timestamp
pub const TIMESTAMP_LEN: usize = 19;

/// chrono format of the date in day-file and archive names
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const FIELD_SEPARATOR: u8 = b'|';

/// Offset of the description when the severity column is present
const TEXT_OFFSET_WITH_SEVERITY: usize = 26;

/// Offset of the description when the severity column is omitted
const TEXT_OFFSET_WITHOUT_SEVERITY: usize = 22;

const SEVERITY_OFFSET: usize = 22;

const DAY_FILE_PREFIX: &str = "log_";
const DAY_FILE_SUFFIX: &str = ".log";

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Information,
    Success,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// All severities, in ascending order
    pub const ALL: [Severity; 6] = [
        Severity::Debug,
        Severity::Information,
        Severity::Success,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Get the display name for this severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Success => "Success",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        }
    }

    /// Single-character code written to the day-file
    pub fn code(&self) -> char {
        match self {
            Severity::Debug => 'D',
            Severity::Information => 'I',
            Severity::Success => 'S',
            Severity::Warning => 'W',
            Severity::Error => 'E',
            Severity::Fatal => 'F',
        }
    }

    /// Map a code back to a severity by the first letter of its name (case-sensitive)
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().starts_with(code))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown severity '{}' (expected one of {})", s, names.join(", "))
            })
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Information,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, second precision
    pub timestamp: NaiveDateTime,
    /// Severity, absent for untyped entries
    pub severity: Option<Severity>,
    /// Message, may span several lines
    pub text: String,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(
        timestamp: NaiveDateTime,
        severity: Option<Severity>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            severity,
            text: text.into(),
        }
    }

    /// Render the entry as it is appended to a day-file, without the trailing terminator
    pub fn encode(&self) -> String {
        let code = self.severity.map(|s| s.code()).unwrap_or(' ');
        format!(
            "{} | {} | {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            code,
            self.text
        )
    }

    /// Parse an accumulated entry (header line plus any continuation lines)
    ///
    /// Returns `None` if the leading 19 characters are not a timestamp.
    pub fn decode(raw: &str) -> Option<Self> {
        let timestamp = parse_timestamp(raw)?;
        let bytes = raw.as_bytes();

        let has_severity_column = bytes.get(20) == Some(&FIELD_SEPARATOR)
            && bytes.get(24) == Some(&FIELD_SEPARATOR);

        let (severity, text_offset) = if has_severity_column {
            let severity = raw
                .get(SEVERITY_OFFSET..)
                .and_then(|rest| rest.chars().next())
                .and_then(Severity::from_code);
            (severity, TEXT_OFFSET_WITH_SEVERITY)
        } else {
            (None, TEXT_OFFSET_WITHOUT_SEVERITY)
        };

        let text = raw.get(text_offset..).unwrap_or_default();

        Some(Self {
            timestamp,
            severity,
            text: text.to_string(),
        })
    }
}

/// Classification of one physical line of a day-file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Starts a new entry
    Header(NaiveDateTime),
    /// Belongs to the entry above it
    Continuation(&'a str),
}

/// Classify a physical line by whether its first 19 characters parse as a timestamp
///
/// A continuation line that happens to start with a valid timestamp is
/// classified as a header; the format has no escape for this.
pub fn classify_line(line: &str) -> LineKind<'_> {
    match parse_timestamp(line) {
        Some(timestamp) => LineKind::Header(timestamp),
        None => LineKind::Continuation(line),
    }
}

fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let prefix = line.get(..TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()
}

/// File name of the day-file for a date (`log_2026-01-21.log`)
pub fn day_file_name(date: NaiveDate) -> String {
    format!(
        "{}{}{}",
        DAY_FILE_PREFIX,
        date.format(DATE_FORMAT),
        DAY_FILE_SUFFIX
    )
}

/// Path of the day-file for a date inside a log directory
pub fn day_file_path(logs_dir: &Path, date: NaiveDate) -> PathBuf {
    logs_dir.join(day_file_name(date))
}

/// Parse the date out of a day-file name, `None` for any other file
pub fn parse_day_file_name(name: &str) -> Option<NaiveDate> {
    let date = name
        .strip_prefix(DAY_FILE_PREFIX)?
        .strip_suffix(DAY_FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}
