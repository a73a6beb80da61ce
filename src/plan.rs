//! Plans and quota tracking
//!
//! A [`Plan`] names two limits: messages per rolling 5-hour billing window and
//! messages per day. [`QuotaTracker`] maps an aggregate's request count onto
//! those limits.
//!
//! The window message count is approximated as `request_count / divisor`
//! (default 5 raw requests per user-visible exchange). The divisor is a
//! placeholder heuristic, so it is configurable rather than fixed.

use crate::config::PlanConfig;
use crate::models::UsageAggregate;
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_WINDOW_DIVISOR: f64 = 5.0;
pub const HIGH_USAGE_THRESHOLD: f64 = 75.0;
pub const CRITICAL_USAGE_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    pub limit_per_5h_window: u32,
    pub daily_limit: u32,
}

/// Built-in plans: (name, window limit, daily limit).
const BUILTIN_PLANS: &[(&str, u32, u32)] = &[
    ("pro", 45, 216),
    ("max5", 225, 1080),
    ("max20", 900, 4320),
];

impl Plan {
    pub fn new(name: impl Into<String>, limit_per_5h_window: u32, daily_limit: u32) -> Result<Self> {
        let name = name.into();
        if limit_per_5h_window == 0 || daily_limit == 0 {
            bail!("Plan '{}' must have positive window and daily limits", name);
        }
        Ok(Self {
            name,
            limit_per_5h_window,
            daily_limit,
        })
    }

    pub fn builtin(name: &str) -> Option<Self> {
        BUILTIN_PLANS
            .iter()
            .find(|(plan, _, _)| plan.eq_ignore_ascii_case(name))
            .map(|(plan, window, daily)| Self {
                name: (*plan).to_string(),
                limit_per_5h_window: *window,
                daily_limit: *daily,
            })
    }

    /// Resolve a plan name against configured plans, then the built-ins.
    pub fn resolve(name: &str, configured: &BTreeMap<String, PlanConfig>) -> Result<Self> {
        if let Some(plan) = configured.get(name) {
            return Self::new(name, plan.window_limit, plan.daily_limit);
        }
        if let Some(plan) = Self::builtin(name) {
            return Ok(plan);
        }

        let mut known: Vec<String> = Self::builtin_names().map(str::to_string).collect();
        known.extend(configured.keys().cloned());
        bail!("Unknown plan '{}'. Known plans: {}", name, known.join(", "))
    }

    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_PLANS.iter().map(|(name, _, _)| *name)
    }
}

/// Usage level for a percentage of a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Normal,
    High,
    Critical,
}

impl UsageStatus {
    pub fn from_percent(percent: f64) -> Self {
        if percent > CRITICAL_USAGE_THRESHOLD {
            UsageStatus::Critical
        } else if percent >= HIGH_USAGE_THRESHOLD {
            UsageStatus::High
        } else {
            UsageStatus::Normal
        }
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UsageStatus::Normal => "normal",
            UsageStatus::High => "high",
            UsageStatus::Critical => "approaching limit",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    pub plan: Plan,
    pub window_messages: f64,
    pub window_percent: f64,
    pub window_status: UsageStatus,
    pub daily_percent: f64,
    pub daily_status: UsageStatus,
    pub over_daily_limit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaTracker {
    window_divisor: f64,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self {
            window_divisor: DEFAULT_WINDOW_DIVISOR,
        }
    }
}

impl QuotaTracker {
    pub fn new(window_divisor: f64) -> Result<Self> {
        if !window_divisor.is_finite() || window_divisor <= 0.0 {
            bail!("Window divisor must be a positive number, got {}", window_divisor);
        }
        Ok(Self { window_divisor })
    }

    pub fn window_divisor(&self) -> f64 {
        self.window_divisor
    }

    /// Approximate billed messages for an aggregate.
    pub fn window_messages(&self, aggregate: &UsageAggregate) -> f64 {
        aggregate.request_count as f64 / self.window_divisor
    }

    /// Share of the window limit used, capped at 100.
    pub fn window_usage_percent(&self, aggregate: &UsageAggregate, plan: &Plan) -> f64 {
        let percent = self.window_messages(aggregate) / f64::from(plan.limit_per_5h_window) * 100.0;
        percent.min(100.0)
    }

    /// Share of the daily limit used. Not capped: above 100 means over the limit.
    pub fn daily_usage_percent(&self, aggregate: &UsageAggregate, plan: &Plan) -> f64 {
        aggregate.request_count as f64 / f64::from(plan.daily_limit) * 100.0
    }

    pub fn report(&self, window: &UsageAggregate, day: &UsageAggregate, plan: &Plan) -> QuotaReport {
        let window_percent = self.window_usage_percent(window, plan);
        let daily_percent = self.daily_usage_percent(day, plan);
        QuotaReport {
            plan: plan.clone(),
            window_messages: self.window_messages(window),
            window_percent,
            window_status: UsageStatus::from_percent(window_percent),
            daily_percent,
            daily_status: UsageStatus::from_percent(daily_percent),
            over_daily_limit: daily_percent > 100.0,
        }
    }
}
