//! Timestamps and time windows

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses a timestamp literal as UTC
///
/// Accepts RFC 3339 and the `YYYY-MM-DD hh:mm:ss[.fff]` form used by sensor
/// uploads. Surrounding quotes are ignored.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let t = text.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if t.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| n.and_utc())
}

/// Why a window was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowViolation {
    /// Start or end missing where a bounded window is required
    Missing,
    /// Span exceeds the configured ceiling
    TooLarge { span_secs: i64, max_secs: i64 },
    /// Start after end
    Inverted,
}

impl fmt::Display for WindowViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowViolation::Missing => write!(f, "both start and end time are required"),
            WindowViolation::TooLarge { span_secs, max_secs } => write!(
                f,
                "window spans {}s which exceeds the {}s limit",
                span_secs, max_secs
            ),
            WindowViolation::Inverted => write!(f, "start time is after end time"),
        }
    }
}

/// Inclusive time range; either end may be open
///
/// Bucket windows produced by [`TimeWindow::half_open`] exclude their end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    end_exclusive: bool,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Inclusive window, rejecting start after end
    pub fn new(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, WindowViolation> {
        let window = Self {
            start,
            end,
            end_exclusive: false,
        };
        window.validate()?;
        Ok(window)
    }

    /// Inclusive window with both ends set
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowViolation> {
        Self::new(Some(start), Some(end))
    }

    /// `[start, end)`, used for calendar buckets
    pub fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            end_exclusive: true,
        }
    }

    pub fn validate(&self) -> Result<(), WindowViolation> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s > e => Err(WindowViolation::Inverted),
            _ => Ok(()),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn span(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if ts < start {
                return false;
            }
        }
        match self.end {
            Some(end) if self.end_exclusive => ts < end,
            Some(end) => ts <= end,
            None => true,
        }
    }

    /// Overlap of two windows; open ends defer to the other side
    pub fn intersect(&self, other: &TimeWindow) -> TimeWindow {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let (end, end_exclusive) = match (self.end, other.end) {
            (Some(a), Some(b)) if a < b => (Some(a), self.end_exclusive),
            (Some(a), Some(b)) if b < a => (Some(b), other.end_exclusive),
            (Some(a), Some(_)) => (Some(a), self.end_exclusive || other.end_exclusive),
            (Some(a), None) => (Some(a), self.end_exclusive),
            (None, Some(b)) => (Some(b), other.end_exclusive),
            (None, None) => (None, false),
        };
        TimeWindow {
            start,
            end,
            end_exclusive,
        }
    }

    /// Requires both ends and a span no longer than `max`
    pub fn check_bound(&self, max: Duration) -> Result<(), WindowViolation> {
        let span = self.span().ok_or(WindowViolation::Missing)?;
        if span > max {
            return Err(WindowViolation::TooLarge {
                span_secs: span.num_seconds(),
                max_secs: max.num_seconds(),
            });
        }
        Ok(())
    }
}
