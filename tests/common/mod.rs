#![allow(dead_code)]

use anyhow::Result;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// One log line with a top-level `usage` object.
pub fn usage_line(timestamp: &str, input: u64, output: u64) -> String {
    format!(
        r#"{{"timestamp":"{}","model":"claude-sonnet-4","usage":{{"input_tokens":{},"output_tokens":{}}}}}"#,
        timestamp, input, output
    )
}

/// Write `{base}/{project}/{file}` with the given lines and return its path.
pub fn write_log(base: &Path, project: &str, file: &str, lines: &[String]) -> Result<PathBuf> {
    let dir = base.join(project);
    fs::create_dir_all(&dir)?;
    let path = dir.join(file);
    fs::write(&path, lines.join("\n"))?;
    Ok(path)
}

/// Rewrite a log and push its modification time forward so the change is
/// visible even on filesystems with coarse timestamps.
pub fn rewrite_log(path: &Path, lines: &[String]) -> Result<()> {
    let before = fs::metadata(path)?.modified()?;
    fs::write(path, lines.join("\n"))?;
    let file = File::options().write(true).open(path)?;
    file.set_modified(before + Duration::from_secs(10))?;
    Ok(())
}

pub fn set_modified(path: &Path, time: SystemTime) -> Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(time)?;
    Ok(())
}
