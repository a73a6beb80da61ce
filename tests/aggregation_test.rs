//! Folding records into project and global usage

mod common;

use claude_quota::analyzer::{ProjectLookup, UsageAnalyzer};
use claude_quota::cache::ParseCache;
use claude_quota::period::{Period, ReportZone};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use common::{usage_line, write_log};
use tempfile::TempDir;

fn analyzer(dir: &TempDir) -> UsageAnalyzer {
    UsageAnalyzer::with_cache(dir.path(), ParseCache::default())
}

#[test]
fn test_project_totals_from_single_file() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "-home-dev-app",
        "conv.jsonl",
        &[
            usage_line("2025-03-10T10:00:00Z", 10, 20),
            usage_line("2025-03-10T10:01:00Z", 5, 5),
            usage_line("2025-03-10T10:02:00Z", 0, 0),
        ],
    )
    .unwrap();

    let project = analyzer(&dir).aggregate_project("-home-dev-app");
    assert_eq!(project.usage.total_tokens, 40);
    assert_eq!(project.usage.request_count, 3);
    assert_eq!(project.usage.input_tokens, 15);
    assert_eq!(project.usage.output_tokens, 25);
    assert_eq!(project.conversation_count, 1);
    assert_eq!(project.display_name(), "home-dev-app");
}

#[test]
fn test_absent_base_dir_is_all_zero() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("projects");
    let analyzer = UsageAnalyzer::with_cache(&missing, ParseCache::default());

    let global = analyzer.aggregate_all();
    assert_eq!(global.usage.total_tokens, 0);
    assert_eq!(global.usage.request_count, 0);
    assert_eq!(global.project_count, 0);
    assert!(global.projects.is_empty());
    assert!(global.usage.models.is_empty());
    assert!(!analyzer.store().has_data_source());
}

#[test]
fn test_global_is_sum_of_projects() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "-a", "1.jsonl", &[usage_line("2025-03-10T10:00:00Z", 10, 1)]).unwrap();
    write_log(dir.path(), "-a", "2.jsonl", &[usage_line("2025-03-11T10:00:00Z", 3, 3)]).unwrap();
    write_log(dir.path(), "-b", "1.jsonl", &[usage_line("2025-03-09T10:00:00Z", 100, 50)]).unwrap();
    // An empty project directory still appears, with zero usage.
    std::fs::create_dir_all(dir.path().join("-empty")).unwrap();

    let global = analyzer(&dir).aggregate_all();
    let summed: u64 = global.projects.values().map(|p| p.usage.total_tokens).sum();
    let requests: u64 = global.projects.values().map(|p| p.usage.request_count).sum();

    assert_eq!(global.usage.total_tokens, summed);
    assert_eq!(global.usage.total_tokens, 167);
    assert_eq!(global.usage.request_count, requests);
    assert_eq!(global.projects.len(), 3);
    assert_eq!(global.project_count, 2);
    assert_eq!(global.projects["-a"].conversation_count, 2);

    let start = global.usage.time_range.start.unwrap();
    let end = global.usage.time_range.end.unwrap();
    assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).unwrap());
    assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 11, 10, 0, 0).unwrap());

    let ranked: Vec<&str> = global
        .projects_by_tokens()
        .iter()
        .map(|p| p.project_id.as_str())
        .collect();
    assert_eq!(ranked, vec!["-b", "-a", "-empty"]);
}

#[test]
fn test_aggregation_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[
            usage_line("2025-03-10T10:00:00Z", 10, 20),
            "{broken".to_string(),
            usage_line("2025-03-10T11:00:00Z", 1, 2),
        ],
    )
    .unwrap();

    let first = analyzer(&dir).aggregate_all();
    let second = analyzer(&dir).aggregate_all();
    assert_eq!(first, second);
}

#[test]
fn test_today_excludes_other_days_and_undated() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[
            usage_line("2025-03-08T10:00:00Z", 1, 1),
            usage_line("2025-03-09T23:59:59Z", 2, 2),
            usage_line("2025-03-10T00:00:00Z", 3, 3),
            usage_line("2025-03-10T09:30:00Z", 4, 4),
            usage_line("not a timestamp", 100, 0),
        ],
    )
    .unwrap();

    let analyzer = analyzer(&dir);
    let unfiltered = analyzer.aggregate_all();
    assert_eq!(unfiltered.usage.total_tokens, 120);
    assert_eq!(unfiltered.usage.request_count, 5);

    let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
    let (start, end) = Period::Today.bounds(now, &ReportZone::Named(Tz::UTC));
    let today = analyzer.aggregate_range(start, end);
    assert_eq!(today.usage.total_tokens, 14);
    assert_eq!(today.usage.request_count, 2);
    assert_eq!(today.project_count, 1);
}

#[test]
fn test_range_counts_only_projects_with_activity() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "-old", "1.jsonl", &[usage_line("2025-01-01T10:00:00Z", 5, 5)]).unwrap();
    write_log(dir.path(), "-new", "1.jsonl", &[usage_line("2025-03-10T10:00:00Z", 5, 5)]).unwrap();

    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap();
    let march = analyzer(&dir).aggregate_range(start, end);

    assert_eq!(march.project_count, 1);
    assert_eq!(march.projects["-old"].usage.total_tokens, 0);
    assert_eq!(march.projects["-old"].conversation_count, 0);
    assert_eq!(march.projects["-new"].conversation_count, 1);
}

#[test]
fn test_find_project_rejects_paths() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "-p", "1.jsonl", &[usage_line("2025-03-10T10:00:00Z", 1, 1)]).unwrap();
    let analyzer = analyzer(&dir);

    assert!(matches!(analyzer.find_project("-p"), ProjectLookup::Found(_)));
    for id in ["../-p", "-p/..", "", "a/b"] {
        assert_eq!(
            analyzer.find_project(id),
            ProjectLookup::NotFound {
                project_id: id.to_string()
            }
        );
    }
}
