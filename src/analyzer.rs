//! Usage Analysis Engine
//!
//! [`UsageAnalyzer`] ties the log store, the reader and its cache together and
//! folds records into the layered usage model:
//!
//! 1. **Discovery**: [`LogStore`] lists project directories and conversation logs
//! 2. **Parsing**: [`LogReader`] parses logs, or serves them from its cache
//! 3. **Folding**: each project is folded on its own into a [`ProjectUsage`]
//! 4. **Global view**: project aggregates are summed into a [`GlobalUsage`]
//!
//! Folding is pure, so re-running any aggregation over unchanged files gives
//! identical totals.
//!
//! ## Usage Example
//!
//! ```no_run
//! use claude_quota::analyzer::UsageAnalyzer;
//! use claude_quota::cache::ParseCache;
//!
//! let analyzer = UsageAnalyzer::with_cache("/home/dev/.claude/projects", ParseCache::default());
//! let global = analyzer.aggregate_all();
//! println!("{} tokens across {} projects", global.usage.total_tokens, global.project_count);
//! ```

use crate::cache::ParseCache;
use crate::file_discovery::LogStore;
use crate::models::{ConversationFile, GlobalUsage, ProjectUsage, UsageAggregate, UsageRecord};
use crate::parser::{LogReader, ParseWarning};
use crate::period::in_range;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Fold a set of records into totals.
pub fn fold<'a, I>(records: I) -> UsageAggregate
where
    I: IntoIterator<Item = &'a UsageRecord>,
{
    UsageAggregate::fold(records)
}

/// Raw records of one project, per conversation file.
#[derive(Debug, Clone)]
pub struct ProjectRecords {
    pub project_id: String,
    pub conversations: Vec<ConversationFile>,
}

impl ProjectRecords {
    pub fn records(&self) -> impl Iterator<Item = &UsageRecord> {
        self.conversations.iter().flat_map(|c| c.records.iter())
    }

    /// Fold every record of the project.
    pub fn usage(&self) -> ProjectUsage {
        ProjectUsage {
            project_id: self.project_id.clone(),
            usage: fold(self.records()),
            conversation_count: self.conversations.len(),
        }
    }

    /// Fold only records dated within `[start, end]`.
    pub fn usage_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ProjectUsage {
        let mut project = ProjectUsage::new(self.project_id.clone());
        for conversation in &self.conversations {
            let before = project.usage.request_count;
            for record in conversation.records.iter().filter(|r| in_range(r, start, end)) {
                project.usage.add_record(record);
            }
            if project.usage.request_count > before {
                project.conversation_count += 1;
            }
        }
        project
    }
}

/// Outcome of a project lookup by id.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectLookup {
    Found(ProjectUsage),
    NotFound { project_id: String },
}

pub struct UsageAnalyzer {
    store: LogStore,
    reader: LogReader,
}

impl UsageAnalyzer {
    pub fn new(store: LogStore, reader: LogReader) -> Self {
        Self { store, reader }
    }

    pub fn with_cache(base_dir: impl Into<PathBuf>, cache: ParseCache) -> Self {
        Self::new(LogStore::new(base_dir), LogReader::new(cache))
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn reader(&self) -> &LogReader {
        &self.reader
    }

    pub fn take_warnings(&self) -> Vec<ParseWarning> {
        self.reader.take_warnings()
    }

    /// Read one project's conversation logs.
    pub fn project_records(&self, project_id: &str) -> ProjectRecords {
        let conversations = self
            .store
            .list_conversation_files(project_id)
            .iter()
            .map(|path| self.reader.read_conversation(project_id, path))
            .collect();
        ProjectRecords {
            project_id: project_id.to_string(),
            conversations,
        }
    }

    /// Read every project's conversation logs.
    pub fn scan(&self) -> Vec<ProjectRecords> {
        let projects = self.store.list_projects();
        debug!(
            base_dir = %self.store.base_dir().display(),
            projects = projects.len(),
            "Scanning projects"
        );

        #[cfg(feature = "parallel")]
        let scanned = projects
            .par_iter()
            .map(|project_id| self.project_records(project_id))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let scanned = projects
            .iter()
            .map(|project_id| self.project_records(project_id))
            .collect();

        scanned
    }

    pub fn aggregate_project(&self, project_id: &str) -> ProjectUsage {
        self.project_records(project_id).usage()
    }

    /// Like [`Self::aggregate_project`], but reports unknown ids as `NotFound`.
    pub fn find_project(&self, project_id: &str) -> ProjectLookup {
        if !self.store.project_exists(project_id) {
            return ProjectLookup::NotFound {
                project_id: project_id.to_string(),
            };
        }
        ProjectLookup::Found(self.aggregate_project(project_id))
    }

    pub fn aggregate_all(&self) -> GlobalUsage {
        global_usage(&self.scan())
    }

    /// Global usage restricted to records dated within `[start, end]`.
    pub fn aggregate_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> GlobalUsage {
        global_usage_in_range(&self.scan(), start, end)
    }
}

pub fn global_usage(projects: &[ProjectRecords]) -> GlobalUsage {
    GlobalUsage::from_projects(projects.iter().map(ProjectRecords::usage))
}

pub fn global_usage_in_range(
    projects: &[ProjectRecords],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> GlobalUsage {
    GlobalUsage::from_projects(projects.iter().map(|p| p.usage_in_range(start, end)))
}
