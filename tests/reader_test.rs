//! Log reading and parse-cache behaviour against real files

mod common;

use claude_quota::cache::{ManualClock, ParseCache};
use claude_quota::parser::{LogReader, WarningKind};
use claude_quota::UsageAnalyzer;
use common::{rewrite_log, usage_line, write_log};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_malformed_line_is_skipped_with_warning() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "-home-dev-app",
        "conv.jsonl",
        &[
            usage_line("2025-03-10T10:00:00Z", 10, 20),
            "{not valid json".to_string(),
            usage_line("2025-03-10T11:00:00Z", 5, 5),
        ],
    )
    .unwrap();

    let reader = LogReader::default();
    let records = reader.read_file(&path);
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().map(|r| r.total_tokens).sum::<u64>(), 40);

    let warnings = reader.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::MalformedLine);
    assert_eq!(warnings[0].line, Some(2));
    assert!(reader.take_warnings().is_empty());
}

#[test]
fn test_lines_without_usage_are_not_records() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[
            r#"{"type":"user","message":{"role":"user","content":"hi"}}"#.to_string(),
            r#"{"type":"assistant","message":{"model":"claude-opus-4","usage":{"input_tokens":3,"output_tokens":4}}}"#.to_string(),
        ],
    )
    .unwrap();

    let reader = LogReader::default();
    let records = reader.read_file(&path);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].total_tokens, 7);
    assert_eq!(records[0].model.as_deref(), Some("claude-opus-4"));
    assert!(reader.take_warnings().is_empty());
}

#[test]
fn test_unchanged_file_is_not_parsed_twice() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[usage_line("2025-03-10T10:00:00Z", 1, 1)],
    )
    .unwrap();

    let reader = LogReader::new(ParseCache::new(Duration::from_secs(300)));
    let first = reader.read_file(&path);
    let second = reader.read_file(&path);

    assert_eq!(reader.parse_count(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    let stats = reader.cache_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);
}

#[test]
fn test_modified_file_is_reread() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[usage_line("2025-03-10T10:00:00Z", 1, 1)],
    )
    .unwrap();

    let reader = LogReader::new(ParseCache::new(Duration::from_secs(300)));
    assert_eq!(reader.read_file(&path).len(), 1);

    rewrite_log(
        &path,
        &[
            usage_line("2025-03-10T10:00:00Z", 1, 1),
            usage_line("2025-03-10T10:05:00Z", 2, 2),
        ],
    )
    .unwrap();

    let records = reader.read_file(&path);
    assert_eq!(records.len(), 2);
    assert_eq!(reader.parse_count(), 2);
    assert_eq!(reader.cache_stats().evictions, 1);
}

#[test]
fn test_entry_expires_after_timeout() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[usage_line("2025-03-10T10:00:00Z", 1, 1)],
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new());
    let cache = ParseCache::with_clock(Duration::from_secs(60), clock.clone());
    let reader = LogReader::new(cache);

    reader.read_file(&path);
    clock.advance(Duration::from_secs(59));
    reader.read_file(&path);
    assert_eq!(reader.parse_count(), 1);

    clock.advance(Duration::from_secs(2));
    reader.read_file(&path);
    assert_eq!(reader.parse_count(), 2);
}

#[test]
fn test_deleted_file_is_unreadable_warning() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "-p",
        "conv.jsonl",
        &[usage_line("2025-03-10T10:00:00Z", 1, 1)],
    )
    .unwrap();

    let reader = LogReader::default();
    assert_eq!(reader.read_file(&path).len(), 1);

    std::fs::remove_file(&path).unwrap();
    assert!(reader.read_file(&path).is_empty());
    assert!(reader.cache().is_empty());

    let warnings = reader.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::UnreadableFile);
}

#[test]
fn test_rescan_reuses_cache_across_projects() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "-a", "1.jsonl", &[usage_line("2025-03-10T10:00:00Z", 1, 1)]).unwrap();
    write_log(dir.path(), "-b", "2.jsonl", &[usage_line("2025-03-10T10:00:00Z", 2, 2)]).unwrap();

    let analyzer = UsageAnalyzer::with_cache(dir.path(), ParseCache::default());
    let first = analyzer.aggregate_all();
    let second = analyzer.aggregate_all();

    assert_eq!(first, second);
    assert_eq!(analyzer.reader().parse_count(), 2);
    assert_eq!(analyzer.reader().cache_stats().hits, 2);
}
