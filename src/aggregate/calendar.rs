//! Bucket calendars for AGGREGATE_BY
//!
//! Buckets are aligned to UTC boundaries. Weeks start on Monday.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Calendar {
    Minute,
    FifteenMinutes,
    ThirtyMinutes,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Calendar {
    /// Parses a calendar name or one of its aliases, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let n: String = name
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match n.as_str() {
            "1min" | "min" | "minute" | "1minute" | "mins" | "minutes" => Some(Calendar::Minute),
            "15min" | "15mins" | "15minutes" => Some(Calendar::FifteenMinutes),
            "30min" | "30mins" | "30minutes" => Some(Calendar::ThirtyMinutes),
            "1hour" | "hour" | "hours" | "1hr" | "hr" => Some(Calendar::Hour),
            "1day" | "day" | "days" => Some(Calendar::Day),
            "1week" | "week" | "weeks" => Some(Calendar::Week),
            "1month" | "month" | "months" => Some(Calendar::Month),
            "1year" | "year" | "years" => Some(Calendar::Year),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Calendar::Minute => "1min",
            Calendar::FifteenMinutes => "15min",
            Calendar::ThirtyMinutes => "30min",
            Calendar::Hour => "1hour",
            Calendar::Day => "1day",
            Calendar::Week => "1week",
            Calendar::Month => "1month",
            Calendar::Year => "1year",
        }
    }

    /// Start of the bucket containing `ts`
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        match self {
            Calendar::Minute => at(date, ts.hour(), ts.minute()),
            Calendar::FifteenMinutes => at(date, ts.hour(), ts.minute() - ts.minute() % 15),
            Calendar::ThirtyMinutes => at(date, ts.hour(), ts.minute() - ts.minute() % 30),
            Calendar::Hour => at(date, ts.hour(), 0),
            Calendar::Day => at(date, 0, 0),
            Calendar::Week => {
                let back = i64::from(date.weekday().num_days_from_monday());
                at(date - Duration::days(back), 0, 0)
            }
            Calendar::Month => at(date.with_day(1).unwrap_or(date), 0, 0),
            Calendar::Year => at(date.with_ordinal(1).unwrap_or(date), 0, 0),
        }
    }

    /// Start of the bucket following the one that starts at `start`
    pub fn next_bucket(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Calendar::Minute => start + Duration::minutes(1),
            Calendar::FifteenMinutes => start + Duration::minutes(15),
            Calendar::ThirtyMinutes => start + Duration::minutes(30),
            Calendar::Hour => start + Duration::hours(1),
            Calendar::Day => start + Duration::days(1),
            Calendar::Week => start + Duration::weeks(1),
            Calendar::Month => start
                .checked_add_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Calendar::Year => start
                .checked_add_months(Months::new(12))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, minute, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Calendar::parse("1hour"), Some(Calendar::Hour));
        assert_eq!(Calendar::parse("HOURS"), Some(Calendar::Hour));
        assert_eq!(Calendar::parse("15min"), Some(Calendar::FifteenMinutes));
        assert_eq!(Calendar::parse("1 day"), Some(Calendar::Day));
        assert_eq!(Calendar::parse("month"), Some(Calendar::Month));
        assert_eq!(Calendar::parse("decade"), None);
    }

    #[test]
    fn test_bucket_start() {
        let t = ts(2013, 3, 6, 14, 37, 12); // a Wednesday
        assert_eq!(Calendar::Minute.bucket_start(t), ts(2013, 3, 6, 14, 37, 0));
        assert_eq!(Calendar::FifteenMinutes.bucket_start(t), ts(2013, 3, 6, 14, 30, 0));
        assert_eq!(Calendar::ThirtyMinutes.bucket_start(t), ts(2013, 3, 6, 14, 30, 0));
        assert_eq!(Calendar::Hour.bucket_start(t), ts(2013, 3, 6, 14, 0, 0));
        assert_eq!(Calendar::Day.bucket_start(t), ts(2013, 3, 6, 0, 0, 0));
        assert_eq!(Calendar::Week.bucket_start(t), ts(2013, 3, 4, 0, 0, 0));
        assert_eq!(Calendar::Month.bucket_start(t), ts(2013, 3, 1, 0, 0, 0));
        assert_eq!(Calendar::Year.bucket_start(t), ts(2013, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_next_bucket() {
        assert_eq!(
            Calendar::Month.next_bucket(ts(2013, 12, 1, 0, 0, 0)),
            ts(2014, 1, 1, 0, 0, 0)
        );
        assert_eq!(
            Calendar::FifteenMinutes.next_bucket(ts(2013, 1, 1, 23, 45, 0)),
            ts(2013, 1, 2, 0, 0, 0)
        );
        assert_eq!(
            Calendar::Week.next_bucket(ts(2013, 3, 4, 0, 0, 0)),
            ts(2013, 3, 11, 0, 0, 0)
        );
    }
}
