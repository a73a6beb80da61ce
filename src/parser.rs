//! JSONL log parsing
//!
//! [`LogReader`] turns conversation logs into ordered [`UsageRecord`]s. Parsing is
//! line-oriented and never fails the caller: a malformed line is skipped, an
//! unreadable file reads as empty, and each recovered failure is kept as a
//! [`ParseWarning`] and logged at `warn` level.
//!
//! Parsed files are served from a [`ParseCache`] keyed by path and
//! modification time.

use crate::cache::{CacheStats, ParseCache};
use crate::extraction::UsageExtractor;
use crate::models::{ConversationFile, UsageRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::fs::{metadata, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    UnreadableFile,
    MalformedLine,
}

/// A failure recovered while reading logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub kind: WarningKind,
    pub path: PathBuf,
    pub line: Option<usize>,
    pub detail: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.line) {
            (WarningKind::MalformedLine, Some(line)) => write!(
                f,
                "{}:{}: skipped malformed line: {}",
                self.path.display(),
                line,
                self.detail
            ),
            (WarningKind::MalformedLine, None) => {
                write!(f, "{}: skipped malformed line: {}", self.path.display(), self.detail)
            }
            (WarningKind::UnreadableFile, _) => {
                write!(f, "{}: unreadable, skipped: {}", self.path.display(), self.detail)
            }
        }
    }
}

/// Raw objects from one file, plus the lines that had to be skipped.
#[derive(Debug, Default)]
pub struct ParsedLines {
    pub objects: Vec<Value>,
    pub warnings: Vec<ParseWarning>,
}

pub struct LogReader {
    extractor: UsageExtractor,
    cache: ParseCache,
    parse_count: AtomicUsize,
    warnings: Mutex<Vec<ParseWarning>>,
}

impl Default for LogReader {
    fn default() -> Self {
        Self::new(ParseCache::default())
    }
}

impl LogReader {
    pub fn new(cache: ParseCache) -> Self {
        Self::with_extractor(UsageExtractor::new(), cache)
    }

    pub fn with_extractor(extractor: UsageExtractor, cache: ParseCache) -> Self {
        Self {
            extractor,
            cache,
            parse_count: AtomicUsize::new(0),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Parse every non-blank line of `path` as a JSON object.
    ///
    /// Fails only if the file cannot be opened; bad lines become warnings.
    pub fn parse_lines(&self, path: &Path) -> Result<ParsedLines> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut parsed = ParsedLines::default();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    parsed.warnings.push(ParseWarning {
                        kind: WarningKind::MalformedLine,
                        path: path.to_path_buf(),
                        line: Some(line_number),
                        detail: e.to_string(),
                    });
                    continue;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) if value.is_object() => parsed.objects.push(value),
                Ok(_) => parsed.warnings.push(ParseWarning {
                    kind: WarningKind::MalformedLine,
                    path: path.to_path_buf(),
                    line: Some(line_number),
                    detail: "not a JSON object".to_string(),
                }),
                Err(e) => parsed.warnings.push(ParseWarning {
                    kind: WarningKind::MalformedLine,
                    path: path.to_path_buf(),
                    line: Some(line_number),
                    detail: e.to_string(),
                }),
            }
        }

        Ok(parsed)
    }

    /// Records of one file, from cache when the file is unchanged.
    pub fn read_file(&self, path: &Path) -> Arc<Vec<UsageRecord>> {
        self.read_with_mtime(path).0
    }

    /// Read a file as a [`ConversationFile`] of `project_id`.
    pub fn read_conversation(&self, project_id: &str, path: &Path) -> ConversationFile {
        let (records, modified) = self.read_with_mtime(path);
        ConversationFile {
            project_id: project_id.to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            modified_time: modified.map(DateTime::<Utc>::from).unwrap_or_default(),
            records,
        }
    }

    fn read_with_mtime(&self, path: &Path) -> (Arc<Vec<UsageRecord>>, Option<SystemTime>) {
        let modified = match metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                self.cache.invalidate(path);
                self.record_warning(ParseWarning {
                    kind: WarningKind::UnreadableFile,
                    path: path.to_path_buf(),
                    line: None,
                    detail: e.to_string(),
                });
                return (Arc::new(Vec::new()), None);
            }
        };

        if let Some(records) = self.cache.get(path, modified) {
            return (records, Some(modified));
        }

        let parsed = match self.parse_lines(path) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.record_warning(ParseWarning {
                    kind: WarningKind::UnreadableFile,
                    path: path.to_path_buf(),
                    line: None,
                    detail: format!("{:#}", e),
                });
                return (Arc::new(Vec::new()), Some(modified));
            }
        };
        self.parse_count.fetch_add(1, Ordering::Relaxed);

        let records: Vec<UsageRecord> = parsed
            .objects
            .iter()
            .filter_map(|raw| self.extractor.extract(raw))
            .collect();

        debug!(
            file = %path.display(),
            lines = parsed.objects.len(),
            records = records.len(),
            skipped = parsed.warnings.len(),
            "Parsed conversation log"
        );

        for warning in parsed.warnings {
            self.record_warning(warning);
        }

        let records = Arc::new(records);
        self.cache
            .insert(path.to_path_buf(), modified, Arc::clone(&records));
        (records, Some(modified))
    }

    fn record_warning(&self, warning: ParseWarning) {
        warn!(
            file = %warning.path.display(),
            line = warning.line,
            kind = ?warning.kind,
            detail = %warning.detail,
            "Recovered log read failure"
        );
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    /// Drain warnings recorded since the last call.
    pub fn take_warnings(&self) -> Vec<ParseWarning> {
        std::mem::take(&mut *self.warnings.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of files actually parsed from disk (cache misses that opened).
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &ParseCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
