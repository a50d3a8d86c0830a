use crate::client::error::ApiError;
use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use core::fmt;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors that abort a single sync key.
#[derive(Debug)]
pub enum SyncError {
    /// Underlying API client error on a fetch the sync cannot do without
    Api(ApiError),
    /// Store failure; the surrounding transaction has been rolled back
    Store(diesel::result::Error),
    /// Missing or unusable configuration for this key
    Config(String),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Api(e) => write!(f, "api error: {}", e),
            SyncError::Store(e) => write!(f, "store error: {}", e),
            SyncError::Config(s) => write!(f, "config error: {}", s),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Api(e) => Some(e),
            SyncError::Store(e) => Some(e),
            SyncError::Config(_) => None,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(value: ApiError) -> Self {
        SyncError::Api(value)
    }
}

impl From<diesel::result::Error> for SyncError {
    fn from(value: diesel::result::Error) -> Self {
        SyncError::Store(value)
    }
}

/// Round to cents, halves away from negative infinity (`floor(v * 100 + 0.5) / 100`).
///
/// Every persisted monetary or ratio value goes through here.
pub fn round_money(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0 + 0.5).floor() / 100.0
}

/// `numerator / denominator`, or 0 when the divisor is 0.
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 { 0.0 } else { numerator / denominator }
}

/// Percent change from `previous` to `current`; `None` when `previous` is 0.
pub fn pct_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| format!("invalid date {:?}, expected YYYY-MM-DD", raw))
}

/// Business date as the POS orders endpoint wants it (`yyyyMMdd`).
pub fn pos_business_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Resolve an IANA zone name, falling back when it is blank or unknown.
pub fn resolve_timezone(name: &str, fallback: Tz) -> Tz {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return fallback;
    }
    trimmed.parse::<Tz>().unwrap_or(fallback)
}

fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime, earliest: bool) -> DateTime<Tz> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(a, b) => {
            if earliest {
                a
            } else {
                b
            }
        }
        // Wall-clock time skipped by a DST jump: take the hour after it.
        LocalResult::None => {
            let shifted = date.and_time(time) + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&date.and_time(time)))
        }
    }
}

/// Start and end of the local business day in `tz`, rendered with `±hhmm` offsets.
///
/// e.g. `("2024-03-01T00:00:00.000-0500", "2024-03-01T23:59:59.999-0500")` for New York.
pub fn local_day_window(date: NaiveDate, tz: Tz) -> (String, String) {
    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";
    let start = local_instant(tz, date, NaiveTime::MIN, true);
    let end_time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    let end = local_instant(tz, date, end_time, false);
    (start.format(FORMAT).to_string(), end.format(FORMAT).to_string())
}

/// Parse timestamps as the POS emits them (`2024-03-01T17:30:00.000+0000`) or RFC 3339.
pub fn parse_source_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// Hour of day (0-23) of a source timestamp, read in `tz`.
pub fn hour_in_timezone(raw: &str, tz: Tz) -> Option<u32> {
    parse_source_timestamp(raw).map(|ts| ts.with_timezone(&tz).hour())
}

/// Calendar date of a loosely formatted source date.
///
/// A leading `YYYY-MM-DD` is taken as-is; otherwise the value is read as a
/// timestamp and converted to its UTC date.
pub fn normalize_source_date(raw: Option<&str>) -> Option<NaiveDate> {
    let value = raw?.trim();
    if let Some(prefix) = value.get(..10)
        && let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
    {
        return Some(date);
    }
    parse_source_timestamp(value).map(|ts| ts.with_timezone(&Utc).date_naive())
}

/// Invoice date, falling back to the created date and then to `range_end`.
pub fn normalize_invoice_date(invoice_date: Option<&str>, created_date: Option<&str>, range_end: NaiveDate) -> NaiveDate {
    normalize_source_date(invoice_date)
        .or_else(|| normalize_source_date(created_date))
        .unwrap_or(range_end)
}

/// `days` dates walking backwards from `start` (inclusive), oldest first.
pub fn dates_back_from(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    let mut dates = (0..days.max(1))
        .filter_map(|offset| start.checked_sub_signed(Duration::days(offset as i64)))
        .collect::<Vec<_>>();
    dates.sort_unstable();
    dates
}

/// Every date from `from` through `to`, inclusive.
pub fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// Serialize a serde-backed enum into its string name (e.g. SCREAMING_SNAKE_CASE).
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}
