//! Core Data Models
//!
//! This module defines the data structures that flow through the usage pipeline,
//! from a single extracted log record up to the account-wide aggregate.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`UsageRecord`] - One assistant response extracted from a JSONL line
//! 2. **Files**: [`ConversationFile`] - The ordered records of one conversation log
//! 3. **Aggregation**: [`UsageAggregate`] - Folded totals over any set of records
//! 4. **Layers**: [`ProjectUsage`] and [`GlobalUsage`] - Per-project and account-wide views
//!
//! ## Features
//!
//! - **Serde Integration**: Aggregates serialize to camelCase JSON for `--json` output
//! - **Deterministic**: Model sets and project maps are ordered, so folding the same
//!   records always produces identical values
//! - **Optional Timestamps**: Records whose timestamp cannot be read still count in
//!   unfiltered totals

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One observed assistant response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
}

impl UsageRecord {
    /// Sum of the four component token counts.
    pub fn component_sum(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }
}

/// One parsed conversation log.
#[derive(Debug, Clone)]
pub struct ConversationFile {
    pub project_id: String,
    pub file_name: String,
    pub modified_time: DateTime<Utc>,
    pub records: Arc<Vec<UsageRecord>>,
}

/// Min/max timestamp among folded records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn include(&mut self, ts: DateTime<Utc>) {
        self.start = Some(self.start.map_or(ts, |s| s.min(ts)));
        self.end = Some(self.end.map_or(ts, |e| e.max(ts)));
    }

    pub fn merge(&mut self, other: &TimeRange) {
        if let Some(start) = other.start {
            self.include(start);
        }
        if let Some(end) = other.end {
            self.include(end);
        }
    }
}

/// Accumulated totals over some set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAggregate {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub request_count: u64,
    pub models: BTreeSet<String>,
    pub time_range: TimeRange,
}

impl UsageAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a set of records. Order does not matter.
    pub fn fold<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a UsageRecord>,
    {
        let mut aggregate = Self::new();
        for record in records {
            aggregate.add_record(record);
        }
        aggregate
    }

    pub fn add_record(&mut self, record: &UsageRecord) {
        self.total_tokens = self.total_tokens.saturating_add(record.total_tokens);
        self.input_tokens = self.input_tokens.saturating_add(record.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(record.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(record.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(record.cache_read_tokens);
        self.request_count = self.request_count.saturating_add(1);

        if let Some(model) = record.model.as_deref().filter(|m| !m.is_empty()) {
            self.models.insert(model.to_string());
        }
        if let Some(ts) = record.timestamp {
            self.time_range.include(ts);
        }
    }

    /// Add another aggregate's totals into this one.
    pub fn merge(&mut self, other: &UsageAggregate) {
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(other.cache_creation_tokens);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(other.cache_read_tokens);
        self.request_count = self.request_count.saturating_add(other.request_count);
        self.models.extend(other.models.iter().cloned());
        self.time_range.merge(&other.time_range);
    }

    pub fn is_empty(&self) -> bool {
        self.request_count == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUsage {
    pub project_id: String,
    #[serde(flatten)]
    pub usage: UsageAggregate,
    pub conversation_count: usize,
}

impl ProjectUsage {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Project name with the encoded leading dash removed.
    pub fn display_name(&self) -> &str {
        self.project_id.strip_prefix('-').unwrap_or(&self.project_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalUsage {
    #[serde(flatten)]
    pub usage: UsageAggregate,
    /// Projects with a nonzero token total.
    pub project_count: usize,
    pub projects: BTreeMap<String, ProjectUsage>,
}

impl GlobalUsage {
    /// Build the account-wide view by summing independently folded projects.
    pub fn from_projects<I>(projects: I) -> Self
    where
        I: IntoIterator<Item = ProjectUsage>,
    {
        let mut global = Self::default();
        for project in projects {
            global.usage.merge(&project.usage);
            if project.usage.total_tokens > 0 {
                global.project_count += 1;
            }
            global.projects.insert(project.project_id.clone(), project);
        }
        global
    }

    /// Projects sorted by token total, largest first.
    pub fn projects_by_tokens(&self) -> Vec<&ProjectUsage> {
        let mut projects: Vec<&ProjectUsage> = self.projects.values().collect();
        projects.sort_by(|a, b| {
            b.usage
                .total_tokens
                .cmp(&a.usage.total_tokens)
                .then_with(|| a.project_id.cmp(&b.project_id))
        });
        projects
    }
}
