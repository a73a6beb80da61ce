//! Burn-rate prediction
//!
//! A heuristic point estimate, not a guarantee: one global rate from requests
//! so far divided by elapsed time. It does not smooth, weight recent activity
//! or detect trend changes.

use crate::models::UsageAggregate;
use crate::plan::{Plan, QuotaTracker};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRate {
    /// Requests per hour; `None` when no time has elapsed.
    pub rate_per_hour: Option<f64>,
    /// `None` when there is no rate or the window is already at its limit.
    pub hours_to_window_limit: Option<f64>,
}

impl BurnRate {
    /// Wall-clock time the window limit would be reached at the current rate.
    pub fn projected_limit_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let hours = self.hours_to_window_limit?;
        let millis = hours * 3_600_000.0;
        if !millis.is_finite() || millis > i64::MAX as f64 {
            return None;
        }
        Duration::try_milliseconds(millis as i64).and_then(|d| now.checked_add_signed(d))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BurnRatePredictor {
    tracker: QuotaTracker,
}

impl BurnRatePredictor {
    pub fn new(tracker: QuotaTracker) -> Self {
        Self { tracker }
    }

    pub fn predict(&self, aggregate: &UsageAggregate, plan: &Plan, elapsed_hours: f64) -> BurnRate {
        if elapsed_hours.is_nan() || elapsed_hours <= 0.0 {
            return BurnRate::default();
        }

        let rate = aggregate.request_count as f64 / elapsed_hours;
        let window_messages = self.tracker.window_messages(aggregate);
        let limit = f64::from(plan.limit_per_5h_window);

        let hours_to_window_limit = if window_messages < limit && rate > 0.0 {
            Some((limit - window_messages) / rate)
        } else {
            None
        };

        BurnRate {
            rate_per_hour: Some(rate),
            hours_to_window_limit,
        }
    }
}

/// Hours between the first record of `aggregate` and `now`, never negative.
pub fn elapsed_hours_since_first(aggregate: &UsageAggregate, now: DateTime<Utc>) -> f64 {
    aggregate
        .time_range
        .start
        .map(|start| (now - start).num_milliseconds().max(0) as f64 / 3_600_000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn requests(n: u64) -> UsageAggregate {
        UsageAggregate {
            request_count: n,
            ..UsageAggregate::default()
        }
    }

    fn plan() -> Plan {
        Plan::new("test", 45, 216).unwrap()
    }

    #[test]
    fn test_zero_elapsed_has_no_rate() {
        let burn = BurnRatePredictor::default().predict(&requests(10), &plan(), 0.0);
        assert_eq!(burn.rate_per_hour, None);
        assert_eq!(burn.hours_to_window_limit, None);

        let burn = BurnRatePredictor::default().predict(&requests(10), &plan(), -1.0);
        assert_eq!(burn.rate_per_hour, None);
    }

    #[test]
    fn test_rate_and_time_to_limit() {
        // 10 requests over 2h → 5/h; 2 messages used of 45
        let burn = BurnRatePredictor::default().predict(&requests(10), &plan(), 2.0);
        assert_eq!(burn.rate_per_hour, Some(5.0));
        assert_eq!(burn.hours_to_window_limit, Some(43.0 / 5.0));
    }

    #[test]
    fn test_no_prediction_at_limit_or_idle() {
        let at_limit = BurnRatePredictor::default().predict(&requests(225), &plan(), 1.0);
        assert_eq!(at_limit.rate_per_hour, Some(225.0));
        assert_eq!(at_limit.hours_to_window_limit, None);

        let idle = BurnRatePredictor::default().predict(&requests(0), &plan(), 1.0);
        assert_eq!(idle.rate_per_hour, Some(0.0));
        assert_eq!(idle.hours_to_window_limit, None);
    }

    #[test]
    fn test_projected_limit_at() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let burn = BurnRate {
            rate_per_hour: Some(1.0),
            hours_to_window_limit: Some(1.5),
        };
        assert_eq!(
            burn.projected_limit_at(now),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 13, 30, 0).unwrap())
        );
        assert_eq!(BurnRate::default().projected_limit_at(now), None);
    }

    #[test]
    fn test_elapsed_hours_since_first() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut aggregate = requests(1);
        assert_eq!(elapsed_hours_since_first(&aggregate, now), 0.0);

        aggregate.time_range.include(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap());
        assert_eq!(elapsed_hours_since_first(&aggregate, now), 3.0);
    }
}
