//! Timeframe semantics and UTC candle alignment.
//!
//! All alignment is integer-millisecond math in UTC. Fixed-span units
//! (`s`, `m`, `h`, `d`, `w`) floor against the epoch; weeks anchor to ISO
//! Monday 00:00 UTC and months to the 1st day 00:00 UTC, bucketed from
//! 1970-01. `mo` has no fixed millisecond span, so span-based helpers
//! return `None` for it.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use thiserror::Error;

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;
pub const WEEK_MS: i64 = 7 * DAY_MS;

/// Errors for timeframe parsing and alignment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("invalid timeframe: {0:?}")]
    Invalid(String),

    #[error("timeframe multiplier must be positive")]
    NonPositive,

    #[error("timeframe 'mo' has no fixed millisecond span")]
    NoFixedSpan,

    #[error("timestamp {0} out of representable range")]
    OutOfRange(i64),
}

/// Timeframe unit. `Mo` is calendar-based; everything else is fixed-span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeframeUnit {
    fn suffix(&self) -> &'static str {
        match self {
            TimeframeUnit::Second => "s",
            TimeframeUnit::Minute => "m",
            TimeframeUnit::Hour => "h",
            TimeframeUnit::Day => "d",
            TimeframeUnit::Week => "w",
            TimeframeUnit::Month => "mo",
        }
    }
}

/// A parsed timeframe like `15m` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    pub n: u32,
    pub unit: TimeframeUnit,
}

impl Timeframe {
    /// Compact label form, e.g. `15m`, `1mo`.
    pub fn label(&self) -> String {
        format!("{}{}", self.n, self.unit.suffix())
    }

    /// Span in milliseconds, or `None` for calendar months.
    pub fn span_ms(&self) -> Option<i64> {
        let unit_ms = match self.unit {
            TimeframeUnit::Second => SECOND_MS,
            TimeframeUnit::Minute => MINUTE_MS,
            TimeframeUnit::Hour => HOUR_MS,
            TimeframeUnit::Day => DAY_MS,
            TimeframeUnit::Week => WEEK_MS,
            TimeframeUnit::Month => return None,
        };
        Some(self.n as i64 * unit_ms)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_timeframe(s)
    }
}

/// Parse a timeframe label such as `5m`, `1h`, `1mo` (case-insensitive).
pub fn parse_timeframe(tf: &str) -> Result<Timeframe, TimeframeError> {
    let s = tf.trim();
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(TimeframeError::Invalid(tf.to_string()));
    }
    let n: u32 = digits
        .parse()
        .map_err(|_| TimeframeError::Invalid(tf.to_string()))?;
    if n == 0 {
        return Err(TimeframeError::NonPositive);
    }
    let unit = match s[digits.len()..].to_ascii_lowercase().as_str() {
        "s" => TimeframeUnit::Second,
        "m" => TimeframeUnit::Minute,
        "h" => TimeframeUnit::Hour,
        "d" => TimeframeUnit::Day,
        "w" => TimeframeUnit::Week,
        "mo" => TimeframeUnit::Month,
        _ => return Err(TimeframeError::Invalid(tf.to_string())),
    };
    Ok(Timeframe { n, unit })
}

/// Span of a timeframe label in milliseconds (`None` for `mo`).
pub fn tf_to_ms(tf: &str) -> Result<Option<i64>, TimeframeError> {
    Ok(parse_timeframe(tf)?.span_ms())
}

fn dt_from_ms(ms: i64) -> Result<DateTime<Utc>, TimeframeError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(TimeframeError::OutOfRange(ms))
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch date")
}

fn floor_months(dt: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    let months_since_epoch = (dt.year() - 1970) * 12 + dt.month0() as i32;
    let bucket = months_since_epoch.div_euclid(n as i32) * n as i32;
    let year = 1970 + bucket.div_euclid(12);
    let month = bucket.rem_euclid(12) as u32 + 1;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid instant")
}

fn add_months(dt: DateTime<Utc>, n: u32) -> DateTime<Utc> {
    let total = dt.year() * 12 + dt.month0() as i32 + n as i32;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid instant")
}

/// Candle open (floor) for `ts_ms` at timeframe `tf`, in milliseconds.
pub fn candle_open_ms(ts_ms: i64, tf: Timeframe) -> Result<i64, TimeframeError> {
    match tf.unit {
        TimeframeUnit::Month => {
            let dt = dt_from_ms(ts_ms)?;
            Ok(floor_months(dt, tf.n).timestamp_millis())
        }
        TimeframeUnit::Week => {
            let dt = dt_from_ms(ts_ms)?;
            let weekday = dt.weekday().num_days_from_monday() as i64;
            let week_start = dt.date_naive() - chrono::Duration::days(weekday);
            let weeks_since_epoch = (week_start - epoch_date()).num_days().div_euclid(7);
            let bucket = weeks_since_epoch.div_euclid(tf.n as i64) * tf.n as i64;
            Ok(bucket * WEEK_MS)
        }
        _ => {
            let span = tf.span_ms().expect("fixed-span unit");
            Ok(ts_ms.div_euclid(span) * span)
        }
    }
}

/// Exclusive candle close for `ts_ms` at `tf` (equals the next candle open).
pub fn candle_close_ms(ts_ms: i64, tf: Timeframe) -> Result<i64, TimeframeError> {
    let open = candle_open_ms(ts_ms, tf)?;
    match tf.unit {
        TimeframeUnit::Month => {
            let dt = dt_from_ms(open)?;
            Ok(add_months(dt, tf.n).timestamp_millis())
        }
        _ => Ok(open + tf.span_ms().expect("fixed-span unit")),
    }
}

/// (open_ms, close_ms) of the candle containing `ts_ms`.
pub fn candle_bounds(ts_ms: i64, tf: Timeframe) -> Result<(i64, i64), TimeframeError> {
    Ok((candle_open_ms(ts_ms, tf)?, candle_close_ms(ts_ms, tf)?))
}

/// True when `ts_ms` sits exactly on a candle boundary for `tf`.
pub fn is_aligned(ts_ms: i64, tf: Timeframe) -> Result<bool, TimeframeError> {
    Ok(candle_open_ms(ts_ms, tf)? == ts_ms)
}

/// Open of the next candle strictly after the one containing `ts_ms`.
pub fn next_candle_open_ms(ts_ms: i64, tf: Timeframe) -> Result<i64, TimeframeError> {
    candle_close_ms(ts_ms, tf)
}

/// Iterate (open_ms, close_ms) candle bounds covering `[start_ms, end_ms)`.
///
/// The first candle starts at the floor of `start_ms`; iteration stops
/// before `end_ms` unless `include_right` and the close lands exactly on it.
pub fn iter_candles(
    start_ms: i64,
    end_ms: i64,
    tf: Timeframe,
    include_right: bool,
) -> Result<Vec<(i64, i64)>, TimeframeError> {
    if end_ms < start_ms {
        return Err(TimeframeError::Invalid(format!(
            "end_ms {} < start_ms {}",
            end_ms, start_ms
        )));
    }
    let mut out = Vec::new();
    let mut open = candle_open_ms(start_ms, tf)?;
    loop {
        let close = candle_close_ms(open, tf)?;
        if close > end_ms || (close == end_ms && !include_right) {
            break;
        }
        out.push((open, close));
        open = close;
    }
    Ok(out)
}

/// Epoch milliseconds to ISO8601 UTC with milliseconds, e.g.
/// `2025-08-23T12:34:56.789Z`.
pub fn to_iso_utc(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => format!("invalid({ms})"),
    }
}

/// Parse ISO8601 / RFC3339 into epoch milliseconds; a naive value is
/// treated as UTC.
pub fn from_iso_to_ms(s: &str) -> Result<i64, TimeframeError> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|_| TimeframeError::Invalid(s.to_string()))
}

/// End-to-end lag between event and ingest timestamps, clamped at zero so
/// slight clock skew does not produce negative metrics.
pub fn lag_ms(ts_event_ms: i64, ingest_ts_ms: i64) -> i64 {
    (ingest_ts_ms - ts_event_ms).max(0)
}

/// UTC calendar date (`YYYY-MM-DD`) and hour for an epoch-ms instant.
pub fn utc_date_hour(ms: i64) -> Result<(String, u32), TimeframeError> {
    let dt = dt_from_ms(ms)?;
    Ok((dt.format("%Y-%m-%d").to_string(), dt.hour()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tf(s: &str) -> Timeframe {
        parse_timeframe(s).unwrap()
    }

    #[test]
    fn parse_labels() {
        assert_eq!(tf("15m").label(), "15m");
        assert_eq!(tf("1MO").label(), "1mo");
        assert!(parse_timeframe("0m").is_err());
        assert!(parse_timeframe("xyz").is_err());
        assert!(parse_timeframe("15").is_err());
    }

    #[test]
    fn fixed_span_alignment() {
        // 2024-01-01T12:34:56Z
        let ts = 1_704_112_496_000;
        assert_eq!(candle_open_ms(ts, tf("1h")).unwrap(), 1_704_110_400_000);
        assert_eq!(candle_close_ms(ts, tf("1h")).unwrap(), 1_704_114_000_000);
        assert!(is_aligned(1_704_110_400_000, tf("1h")).unwrap());
        assert!(!is_aligned(ts, tf("1h")).unwrap());
    }

    #[test]
    fn week_aligns_to_iso_monday() {
        // 2024-01-03 is a Wednesday; the week opens Monday 2024-01-01.
        let ts = from_iso_to_ms("2024-01-03T10:00:00Z").unwrap();
        let open = candle_open_ms(ts, tf("1w")).unwrap();
        assert_eq!(to_iso_utc(open), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn month_is_calendar_anchored() {
        let ts = from_iso_to_ms("2024-02-29T23:59:59Z").unwrap();
        let (open, close) = candle_bounds(ts, tf("1mo")).unwrap();
        assert_eq!(to_iso_utc(open), "2024-02-01T00:00:00.000Z");
        assert_eq!(to_iso_utc(close), "2024-03-01T00:00:00.000Z");
    }

    #[test]
    fn quarterly_month_buckets() {
        let ts = from_iso_to_ms("2024-05-15T00:00:00Z").unwrap();
        let open = candle_open_ms(ts, tf("3mo")).unwrap();
        assert_eq!(to_iso_utc(open), "2024-04-01T00:00:00.000Z");
    }

    #[test]
    fn iter_candles_covers_range() {
        let start = from_iso_to_ms("2024-01-01T00:10:00Z").unwrap();
        let end = from_iso_to_ms("2024-01-01T03:00:00Z").unwrap();
        let candles = iter_candles(start, end, tf("1h"), false).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].0, from_iso_to_ms("2024-01-01T00:00:00Z").unwrap());
        let with_right = iter_candles(start, end, tf("1h"), true).unwrap();
        assert_eq!(with_right.len(), 3);
    }

    #[test]
    fn lag_clamps_negative_skew() {
        assert_eq!(lag_ms(1_000, 1_250), 250);
        assert_eq!(lag_ms(1_250, 1_000), 0);
    }

    proptest! {
        // candle_open(ts) <= ts < candle_open(ts) + span for every fixed-span tf
        #[test]
        fn open_bounds_contain_ts(ts in 1i64..4_102_444_800_000i64, which in 0usize..5) {
            let labels = ["1m", "5m", "1h", "1d", "1w"];
            let t = tf(labels[which]);
            let open = candle_open_ms(ts, t).unwrap();
            let close = candle_close_ms(ts, t).unwrap();
            prop_assert!(open <= ts);
            prop_assert!(ts < close);
            prop_assert_eq!(close - open, t.span_ms().unwrap());
        }

        #[test]
        fn month_bounds_contain_ts(ts in 1i64..4_102_444_800_000i64) {
            let t = tf("1mo");
            let open = candle_open_ms(ts, t).unwrap();
            let close = candle_close_ms(ts, t).unwrap();
            prop_assert!(open <= ts);
            prop_assert!(ts < close);
            let dt = Utc.timestamp_millis_opt(open).unwrap();
            prop_assert_eq!(dt.day(), 1);
            prop_assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
        }
    }
}
