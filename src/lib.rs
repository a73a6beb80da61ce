//! Claude Quota Library
//!
//! Reads the JSONL conversation logs Claude writes per project, folds token
//! usage into per-project and account-wide totals, and relates recent activity
//! to a subscription plan's rolling 5-hour window and daily limits.
//!
//! ## Core Features
//!
//! - **Schema-tolerant extraction**: usage objects are found in any of several
//!   known locations and token counts are read under their common aliases
//! - **Cached parsing**: parsed files are kept by modification time and
//!   re-read only after they change or the cache timeout passes
//! - **Layered aggregation**: records fold into project totals, project
//!   totals into a global view, with period filtering on top
//! - **Quota tracking**: window and daily usage percentages with status levels
//!   and a burn-rate prediction of when the window limit will be reached
//!
//! ## Architecture Overview
//!
//! - [`file_discovery`] - Locating the projects directory and conversation logs
//! - [`extraction`] - Finding usage, model and timestamp fields in one log object
//! - [`timestamp_parser`] - Parsing the timestamp formats found in logs
//! - [`parser`] - Line-by-line reading with recovered warnings
//! - [`cache`] - Modification-time keyed cache of parsed files
//! - [`models`] - Records and aggregates
//! - [`analyzer`] - Project and global aggregation
//! - [`period`] - Timezones and reporting periods
//! - [`plan`] - Plans and quota percentages
//! - [`predictor`] - Burn rate and projected limit time
//! - [`monitor`] - Snapshot building and the refresh loop
//! - [`display`] - Terminal and JSON rendering
//! - [`config`] - Configuration with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Point
//!
//! ```no_run
//! use claude_quota::{UsageAnalyzer, cache::ParseCache};
//! use claude_quota::plan::{Plan, QuotaTracker};
//!
//! let analyzer = UsageAnalyzer::with_cache("/home/dev/.claude/projects", ParseCache::default());
//! let global = analyzer.aggregate_all();
//! let plan = Plan::builtin("pro").unwrap();
//! let percent = QuotaTracker::default().daily_usage_percent(&global.usage, &plan);
//! println!("{} projects, {:.1}% of the daily limit", global.project_count, percent);
//! ```

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod display;
pub mod extraction;
pub mod file_discovery;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod parser;
pub mod period;
pub mod plan;
pub mod predictor;
pub mod timestamp_parser;

pub use analyzer::UsageAnalyzer;
pub use models::*;
