//! Snapshot building and the refresh loop
//!
//! A refresh cycle is strictly sequential: scan and parse logs (through the
//! cache), fold projects, restrict to the requested period, then derive quota
//! usage and the burn rate. [`Monitor::run`] either renders one snapshot or
//! re-renders on a fixed interval until Ctrl+C.
//!
//! Refreshes never overlap. The blocking scan runs on the blocking pool and is
//! awaited before the next tick is considered; ticks missed while a scan was
//! still running are skipped rather than queued.
//!
//! ### Quota inputs
//! - **Window**: records dated within the last `window_hours` (5 by default)
//! - **Day**: records dated within today in the report zone
//! - **Burn rate**: window requests over the hours since the window's first record

use crate::analyzer::{global_usage, global_usage_in_range, ProjectLookup, UsageAnalyzer};
use crate::cache::CacheStats;
use crate::display::DisplayManager;
use crate::logging::refresh_span;
use crate::models::{GlobalUsage, ProjectUsage};
use crate::parser::ParseWarning;
use crate::period::{Period, ReportZone};
use crate::plan::{Plan, QuotaReport, QuotaTracker};
use crate::predictor::{elapsed_hours_since_first, BurnRate, BurnRatePredictor};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// What a snapshot reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportKind {
    Summary,
    Projects,
    Project(String),
    Period(Period),
}

impl ReportKind {
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Summary => "summary",
            ReportKind::Projects => "projects",
            ReportKind::Project(_) => "project",
            ReportKind::Period(Period::Today) => "today",
            ReportKind::Period(Period::Week) => "week",
            ReportKind::Period(Period::Month) => "month",
            ReportKind::Period(Period::Custom { .. }) => "range",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SnapshotView {
    Summary {
        usage: GlobalUsage,
    },
    Projects {
        usage: GlobalUsage,
    },
    Project {
        usage: ProjectUsage,
    },
    Period {
        label: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        usage: GlobalUsage,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub generated_at: DateTime<Utc>,
    pub has_data_source: bool,
    pub view: SnapshotView,
    pub quota: QuotaReport,
    pub burn_rate: BurnRate,
    pub projected_limit_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub files_parsed: usize,
    pub timeout_secs: u64,
}

/// Everything a refresh cycle needs, resolved once from configuration.
pub struct SnapshotContext {
    pub analyzer: UsageAnalyzer,
    pub plan: Plan,
    pub tracker: QuotaTracker,
    pub zone: ReportZone,
    pub window: Duration,
}

impl SnapshotContext {
    pub fn build_snapshot(&self, kind: &ReportKind, now: DateTime<Utc>) -> Result<UsageSnapshot> {
        let projects = self.analyzer.scan();

        let window_start = now
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let window = global_usage_in_range(&projects, window_start, now).usage;
        let (day_start, day_end) = Period::Today.bounds(now, &self.zone);
        let day = global_usage_in_range(&projects, day_start, day_end).usage;

        let quota = self.tracker.report(&window, &day, &self.plan);
        let elapsed = elapsed_hours_since_first(&window, now);
        let burn_rate = BurnRatePredictor::new(self.tracker).predict(&window, &self.plan, elapsed);

        let view = match kind {
            ReportKind::Summary => SnapshotView::Summary {
                usage: global_usage(&projects),
            },
            ReportKind::Projects => SnapshotView::Projects {
                usage: global_usage(&projects),
            },
            ReportKind::Project(project_id) => match self.lookup(&projects, project_id) {
                ProjectLookup::Found(usage) => SnapshotView::Project { usage },
                ProjectLookup::NotFound { project_id } => {
                    bail!("Unknown project: {}", project_id)
                }
            },
            ReportKind::Period(period) => {
                let (start, end) = period.bounds(now, &self.zone);
                SnapshotView::Period {
                    label: period.label(),
                    start,
                    end,
                    usage: global_usage_in_range(&projects, start, end),
                }
            }
        };

        debug!(
            kind = kind.name(),
            projects = projects.len(),
            window_requests = window.request_count,
            "Built usage snapshot"
        );

        Ok(UsageSnapshot {
            generated_at: now,
            has_data_source: self.analyzer.store().has_data_source(),
            view,
            quota,
            burn_rate,
            projected_limit_at: burn_rate.projected_limit_at(now),
            warnings: self.analyzer.take_warnings(),
        })
    }

    fn lookup(&self, projects: &[crate::analyzer::ProjectRecords], project_id: &str) -> ProjectLookup {
        if !self.analyzer.store().project_exists(project_id) {
            return ProjectLookup::NotFound {
                project_id: project_id.to_string(),
            };
        }
        match projects.iter().find(|p| p.project_id == project_id) {
            Some(records) => ProjectLookup::Found(records.usage()),
            // Created after the scan started.
            None => ProjectLookup::Found(self.analyzer.aggregate_project(project_id)),
        }
    }

    /// Warm the cache with a full scan and report its counters.
    pub fn cache_report(&self) -> CacheReport {
        let _ = self.analyzer.scan();
        let reader = self.analyzer.reader();
        CacheReport {
            stats: reader.cache_stats(),
            files_parsed: reader.parse_count(),
            timeout_secs: reader.cache().timeout().as_secs(),
        }
    }

    pub fn clear_cache(&self) -> usize {
        let dropped = self.analyzer.reader().cache().clear();
        info!(dropped, "Cleared parse cache");
        dropped
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub once: bool,
    pub interval: std::time::Duration,
}

pub struct Monitor {
    context: Arc<SnapshotContext>,
    display: DisplayManager,
    options: MonitorOptions,
}

impl Monitor {
    pub fn new(context: SnapshotContext, display: DisplayManager, options: MonitorOptions) -> Self {
        Self {
            context: Arc::new(context),
            display,
            options,
        }
    }

    async fn refresh(&self, kind: &ReportKind) -> Result<UsageSnapshot> {
        let context = Arc::clone(&self.context);
        let kind = kind.clone();
        tokio::task::spawn_blocking(move || {
            let span = refresh_span(kind.name());
            let _entered = span.enter();
            context.build_snapshot(&kind, Utc::now())
        })
        .await
        .context("Refresh task failed")?
    }

    /// Render once, or refresh on the interval until Ctrl+C.
    pub async fn run(&self, kind: ReportKind) -> Result<()> {
        self.run_until(kind, tokio::signal::ctrl_c()).await
    }

    /// Like [`Monitor::run`], stopping when `shutdown` resolves. A pending
    /// refresh is abandoned rather than awaited.
    pub async fn run_until<F>(&self, kind: ReportKind, shutdown: F) -> Result<()>
    where
        F: Future,
    {
        if self.options.once || self.display.is_json() {
            let snapshot = self.refresh(&kind).await?;
            self.display.render(&snapshot)?;
            return Ok(());
        }

        let mut interval = time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        self.display.hide_cursor();
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupted, stopping refresh loop");
                    break Ok(());
                }
                _ = interval.tick() => {
                    // The scan can take a while; shutdown must not wait for it.
                    let snapshot = tokio::select! {
                        _ = &mut shutdown => {
                            info!("Interrupted during refresh, stopping refresh loop");
                            break Ok(());
                        }
                        snapshot = self.refresh(&kind) => snapshot,
                    };
                    match snapshot {
                        Ok(snapshot) => {
                            self.display.clear_screen();
                            if let Err(e) = self.display.render(&snapshot) {
                                break Err(e);
                            }
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
        };
        self.display.show_cursor();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ParseCache;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::fs;
    use tempfile::TempDir;

    fn context(base: &std::path::Path) -> SnapshotContext {
        SnapshotContext {
            analyzer: UsageAnalyzer::with_cache(base, ParseCache::default()),
            plan: Plan::new("test", 10, 100).unwrap(),
            tracker: QuotaTracker::default(),
            zone: ReportZone::Named(Tz::UTC),
            window: Duration::hours(5),
        }
    }

    #[test]
    fn test_snapshot_quota_uses_window_records() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("-p");
        fs::create_dir_all(&project).unwrap();
        let mut lines = Vec::new();
        // Ten requests one hour ago, five from yesterday.
        for _ in 0..10 {
            lines.push(r#"{"timestamp":"2025-03-10T11:00:00Z","usage":{"input_tokens":1}}"#);
        }
        for _ in 0..5 {
            lines.push(r#"{"timestamp":"2025-03-09T11:00:00Z","usage":{"input_tokens":1}}"#);
        }
        fs::write(project.join("c.jsonl"), lines.join("\n")).unwrap();

        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let snapshot = context(dir.path())
            .build_snapshot(&ReportKind::Summary, now)
            .unwrap();

        assert_eq!(snapshot.quota.window_messages, 2.0);
        assert_eq!(snapshot.quota.window_percent, 20.0);
        assert_eq!(snapshot.quota.daily_percent, 10.0);
        assert_eq!(snapshot.burn_rate.rate_per_hour, Some(10.0));
        match snapshot.view {
            SnapshotView::Summary { usage } => assert_eq!(usage.usage.request_count, 15),
            other => panic!("unexpected view: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_project_is_error() {
        let dir = TempDir::new().unwrap();
        let err = context(dir.path())
            .build_snapshot(&ReportKind::Project("ghost".to_string()), Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown project: ghost"));
    }

    #[test]
    fn test_oversized_window_does_not_overflow() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("-p");
        fs::create_dir_all(&project).unwrap();
        fs::write(
            project.join("c.jsonl"),
            r#"{"timestamp":"2025-03-10T11:00:00Z","usage":{"input_tokens":1}}"#,
        )
        .unwrap();

        let mut context = context(dir.path());
        context.window = Duration::days(365 * 1_000_000);
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let snapshot = context.build_snapshot(&ReportKind::Summary, now).unwrap();
        assert_eq!(snapshot.quota.window_messages, 0.2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_loop_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let monitor = Monitor::new(
            context(dir.path()),
            DisplayManager::default(),
            MonitorOptions {
                once: false,
                interval: std::time::Duration::from_secs(3600),
            },
        );

        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(50));
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            monitor.run_until(ReportKind::Summary, shutdown),
        )
        .await;
        assert!(matches!(outcome, Ok(Ok(()))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_before_first_refresh() {
        let dir = TempDir::new().unwrap();
        let monitor = Monitor::new(
            context(dir.path()),
            DisplayManager::default(),
            MonitorOptions {
                once: false,
                interval: std::time::Duration::from_secs(3600),
            },
        );

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            monitor.run_until(ReportKind::Summary, std::future::ready(())),
        )
        .await;
        assert!(matches!(outcome, Ok(Ok(()))));
    }

    #[test]
    fn test_absent_base_dir_snapshot() {
        let snapshot = context(std::path::Path::new("/no/such/dir"))
            .build_snapshot(&ReportKind::Projects, Utc::now())
            .unwrap();
        assert!(!snapshot.has_data_source);
        assert_eq!(snapshot.quota.window_percent, 0.0);
        assert_eq!(snapshot.burn_rate, BurnRate::default());
    }
}
