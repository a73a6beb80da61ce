//! Date-range restriction of usage
//!
//! Filtering works on raw records, never on a folded aggregate, because
//! folding discards the per-record timestamps. A record is kept when
//! `start <= timestamp <= end`; records without a timestamp cannot be dated
//! and are excluded from every period.
//!
//! Named periods are computed in a [`ReportZone`]: the system zone or an IANA
//! zone name.

use crate::models::{UsageAggregate, UsageRecord};
use anyhow::{anyhow, Result};
use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

/// Timezone in which named periods are bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportZone {
    Local,
    Named(Tz),
}

impl Default for ReportZone {
    fn default() -> Self {
        ReportZone::Local
    }
}

impl FromStr for ReportZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(ReportZone::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") {
            return Ok(ReportZone::Named(Tz::UTC));
        }
        trimmed.parse::<Tz>().map(ReportZone::Named).map_err(|e| {
            anyhow!(
                "Invalid timezone '{}': {}. Example: 'local', 'UTC' or 'America/Los_Angeles'",
                trimmed,
                e
            )
        })
    }
}

impl fmt::Display for ReportZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportZone::Local => f.write_str("local"),
            ReportZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl ReportZone {
    /// Calendar date of `instant` in this zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            ReportZone::Local => instant.with_timezone(&Local).date_naive(),
            ReportZone::Named(tz) => instant.with_timezone(tz).date_naive(),
        }
    }

    /// First instant of `date` in this zone.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        match self {
            ReportZone::Local => start_of_day_in(&Local, date),
            ReportZone::Named(tz) => start_of_day_in(tz, date),
        }
    }

    /// Last millisecond of `date` in this zone.
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let next = date.succ_opt().unwrap_or(date);
        self.start_of_day(next) - Duration::milliseconds(1)
    }

    pub fn format(&self, instant: DateTime<Utc>, pattern: &str) -> String {
        match self {
            ReportZone::Local => instant.with_timezone(&Local).format(pattern).to_string(),
            ReportZone::Named(tz) => instant.with_timezone(tz).format(pattern).to_string(),
        }
    }
}

fn start_of_day_in<Z: TimeZone>(zone: &Z, date: NaiveDate) -> DateTime<Utc> {
    // Midnight can fall in a DST gap; take the first valid instant after it.
    for hour in 0..3 {
        let naive = date.and_time(NaiveTime::MIN) + Duration::hours(hour);
        match zone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => continue,
        }
    }
    date.and_time(NaiveTime::MIN).and_utc()
}

/// A reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    /// Sunday through Saturday.
    Week,
    Month,
    /// Inclusive calendar dates.
    Custom { since: NaiveDate, until: NaiveDate },
}

impl Period {
    /// Inclusive `[start, end]` bounds of the period containing `now`.
    pub fn bounds(&self, now: DateTime<Utc>, zone: &ReportZone) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = zone.date_of(now);
        let (first, last) = match *self {
            Period::Today => (today, today),
            Period::Week => {
                let offset = i64::from(today.weekday().num_days_from_sunday());
                let sunday = today - Duration::days(offset);
                (sunday, sunday + Duration::days(6))
            }
            Period::Month => {
                let first = today.with_day(1).unwrap_or(today);
                (first, last_day_of_month(first))
            }
            Period::Custom { since, until } => (since, until),
        };
        (zone.start_of_day(first), zone.end_of_day(last))
    }

    pub fn label(&self) -> String {
        match self {
            Period::Today => "Today".to_string(),
            Period::Week => "This Week".to_string(),
            Period::Month => "This Month".to_string(),
            Period::Custom { since, until } => format!("{} to {}", since, until),
        }
    }
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

/// Whether `record` falls within the inclusive range.
pub fn in_range(record: &UsageRecord, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    record
        .timestamp
        .map_or(false, |ts| start <= ts && ts <= end)
}

/// Fold only the records dated within `[start, end]`.
pub fn filter_by_range<'a, I>(records: I, start: DateTime<Utc>, end: DateTime<Utc>) -> UsageAggregate
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    UsageAggregate::fold(records.into_iter().filter(|r| in_range(r, start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn record_at(ts: Option<DateTime<Utc>>, tokens: u64) -> UsageRecord {
        UsageRecord {
            timestamp: ts,
            model: None,
            input_tokens: tokens,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            total_tokens: tokens,
        }
    }

    #[test]
    fn test_today_bounds_utc() {
        let zone: ReportZone = "UTC".parse().unwrap();
        let (start, end) = Period::Today.bounds(utc(2025, 6, 11, 15, 30), &zone);
        assert_eq!(start, utc(2025, 6, 11, 0, 0));
        assert_eq!(end, utc(2025, 6, 12, 0, 0) - Duration::milliseconds(1));
    }

    #[test]
    fn test_today_bounds_named_zone() {
        let zone: ReportZone = "America/New_York".parse().unwrap();
        // 02:00 UTC on the 11th is still the 10th in New York (UTC-4 in June).
        let (start, end) = Period::Today.bounds(utc(2025, 6, 11, 2, 0), &zone);
        assert_eq!(start, utc(2025, 6, 10, 4, 0));
        assert_eq!(end, utc(2025, 6, 11, 4, 0) - Duration::milliseconds(1));
    }

    #[test]
    fn test_today_spans_dst_transitions() {
        let zone: ReportZone = "America/New_York".parse().unwrap();

        // Spring forward: 2025-03-09 has 23 hours.
        let (start, end) = Period::Today.bounds(utc(2025, 3, 9, 15, 0), &zone);
        assert_eq!(start, utc(2025, 3, 9, 5, 0));
        assert_eq!(end, utc(2025, 3, 10, 4, 0) - Duration::milliseconds(1));
        assert_eq!(end - start, Duration::hours(23) - Duration::milliseconds(1));

        // Fall back: 2025-11-02 has 25 hours.
        let (start, end) = Period::Today.bounds(utc(2025, 11, 2, 15, 0), &zone);
        assert_eq!(start, utc(2025, 11, 2, 4, 0));
        assert_eq!(end - start, Duration::hours(25) - Duration::milliseconds(1));
    }

    #[test]
    fn test_day_starting_in_dst_gap() {
        // Santiago skips from 00:00 to 01:00 on 2024-09-08.
        let zone: ReportZone = "America/Santiago".parse().unwrap();
        let (start, end) = Period::Today.bounds(utc(2024, 9, 8, 15, 0), &zone);
        assert_eq!(start, utc(2024, 9, 8, 4, 0));
        assert_eq!(end, utc(2024, 9, 9, 3, 0) - Duration::milliseconds(1));
    }

    #[test]
    fn test_week_runs_sunday_to_saturday() {
        let zone = ReportZone::Named(Tz::UTC);
        // 2025-06-11 is a Wednesday.
        let (start, end) = Period::Week.bounds(utc(2025, 6, 11, 9, 0), &zone);
        assert_eq!(start, utc(2025, 6, 8, 0, 0));
        assert_eq!(end, utc(2025, 6, 15, 0, 0) - Duration::milliseconds(1));

        // A Sunday starts its own week.
        let (start, _) = Period::Week.bounds(utc(2025, 6, 8, 9, 0), &zone);
        assert_eq!(start, utc(2025, 6, 8, 0, 0));
    }

    #[test]
    fn test_month_bounds_include_december_rollover() {
        let zone = ReportZone::Named(Tz::UTC);
        let (start, end) = Period::Month.bounds(utc(2024, 2, 14, 9, 0), &zone);
        assert_eq!(start, utc(2024, 2, 1, 0, 0));
        assert_eq!(end, utc(2024, 3, 1, 0, 0) - Duration::milliseconds(1));

        let (start, end) = Period::Month.bounds(utc(2024, 12, 31, 23, 0), &zone);
        assert_eq!(start, utc(2024, 12, 1, 0, 0));
        assert_eq!(end, utc(2025, 1, 1, 0, 0) - Duration::milliseconds(1));
    }

    #[test]
    fn test_filter_is_inclusive_and_skips_undated() {
        let start = utc(2025, 1, 1, 0, 0);
        let end = utc(2025, 1, 2, 0, 0);
        let records = vec![
            record_at(Some(start), 1),
            record_at(Some(end), 2),
            record_at(Some(end + Duration::milliseconds(1)), 4),
            record_at(None, 8),
        ];

        let filtered = filter_by_range(&records, start, end);
        assert_eq!(filtered.total_tokens, 3);
        assert_eq!(filtered.request_count, 2);
    }

    #[test]
    fn test_invalid_zone_rejected() {
        let err = "Mars/Olympus_Mons".parse::<ReportZone>().unwrap_err();
        assert!(err.to_string().contains("Invalid timezone"));
        assert_eq!("local".parse::<ReportZone>().unwrap(), ReportZone::Local);
    }
}
