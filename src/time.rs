use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::constants::Constants;

/// Calendar date of `utc_time` in the given timezone
pub fn local_date(tz: Tz, utc_time: DateTime<Utc>) -> NaiveDate {
    tz.from_utc_datetime(&utc_time.naive_utc()).date_naive()
}

/// Convert UTC DateTime to a local formatted string
pub fn utc_to_local_string(tz: Tz, utc_time: DateTime<Utc>) -> String {
    tz.from_utc_datetime(&utc_time.naive_utc())
        .format(Constants::DATETIME_FORMAT)
        .to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(Constants::DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), Constants::DATE_FORMAT).ok()
}

/// Parse an IANA timezone name such as `Asia/Tokyo`
pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

/// Local midnight of `date`, expressed in UTC
pub fn local_midnight_utc(tz: Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    let local = tz.from_local_datetime(&naive).earliest()?;
    Some(local.with_timezone(&Utc))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(d) => d,
        None => return 0,
    };
    let next = first + Months::new(1);
    (next - first).num_days() as u32
}

pub fn days_ago(date: NaiveDate, days: i64) -> NaiveDate {
    date - Duration::days(days)
}

pub fn months_ago(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(date)
}

/// Weekday column (Sunday = 0) of the first day of a month
pub fn first_weekday_offset(year: i32, month: u32) -> u32 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.weekday().num_days_from_sunday())
        .unwrap_or(0)
}
