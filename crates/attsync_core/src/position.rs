//! Checkpoint positions.
//!
//! A [`Position`] is the `(event_time, sequence)` pair of the last event a
//! source has durably committed. Positions are ordered by time first and use
//! the sequence id as a tie-break.
//!
//! ## Sequence ordering
//!
//! Sources hand out sequence ids as strings. Two numeric ids compare
//! numerically (`"9" < "10"`), two non-numeric ids compare lexically. To keep
//! a total order when the two kinds meet, the empty id sorts first, then all
//! numeric ids, then all non-numeric ids.
//!
//! ## Persisted form
//!
//! `"<YYYY-MM-DD HH:MM:SS>|<sequence>"` on a single line. A line without a
//! `|` is accepted as a bare timestamp with an empty sequence.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Timestamp format used in checkpoints, logs and the sink.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A source-local tie-break identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(String);

impl SequenceId {
    /// Creates a sequence id, trimming surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.len() == value.len() {
            Self(value)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Returns the empty sequence id.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no id is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if the id is made of ASCII digits only.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    fn rank(&self) -> u8 {
        if self.is_empty() {
            0
        } else if self.is_numeric() {
            1
        } else {
            2
        }
    }
}

/// Compares two digit strings of any length without parsing them.
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for SequenceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.rank(), other.rank()) {
            (1, 1) => cmp_digits(&self.0, &other.0),
            (a, b) if a == b => self.0.cmp(&other.0),
            (a, b) => a.cmp(&b),
        }
    }
}

impl PartialOrd for SequenceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SequenceId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SequenceId {}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequenceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SequenceId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<u64> for SequenceId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// The last committed position of a source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Event time of the last committed event (source-local clock).
    pub event_time: NaiveDateTime,
    /// Sequence id of the last committed event.
    pub sequence: SequenceId,
}

impl Position {
    /// Creates a new position.
    pub fn new(event_time: NaiveDateTime, sequence: impl Into<SequenceId>) -> Self {
        Self {
            event_time,
            sequence: sequence.into(),
        }
    }

    /// Returns true if an event at `(event_time, sequence)` comes strictly
    /// after this position.
    pub fn is_before(&self, event_time: &NaiveDateTime, sequence: &SequenceId) -> bool {
        match self.event_time.cmp(event_time) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.sequence < *sequence,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.event_time.format(TIME_FORMAT), self.sequence)
    }
}

/// Error returned when a persisted position cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePositionError(String);

impl fmt::Display for ParsePositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid position: {}", self.0)
    }
}

impl std::error::Error for ParsePositionError {}

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (time_part, seq_part) = match s.rsplit_once('|') {
            Some((time, seq)) => (time, seq),
            None => (s, ""),
        };

        let event_time = parse_time(time_part.trim())
            .ok_or_else(|| ParsePositionError(format!("bad timestamp {time_part:?}")))?;

        Ok(Self::new(event_time, seq_part))
    }
}

/// Parses a checkpoint/sink timestamp, accepting the ISO `T` separator too.
pub fn parse_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
