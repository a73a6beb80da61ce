//! Output Formatting and Display Management
//!
//! This module renders usage snapshots either as colored terminal reports or as
//! structured JSON for programmatic consumption.
//!
//! ## Report Layout
//!
//! Every terminal report has the same three parts:
//! - **Usage**: totals for the requested view (summary, one project, all
//!   projects, or a period with its per-project breakdown)
//! - **Quota**: window and daily usage bars, colored by status, for the active plan
//! - **Burn rate**: requests per hour and the projected time the window limit is hit
//!
//! Quiet mode drops the banner, verbose mode appends recovered parse warnings
//! on stderr.
//!
//! ## JSON Output
//!
//! With JSON enabled the whole [`UsageSnapshot`] is printed once:
//! ```json
//! {
//!   "generatedAt": "2025-03-10T12:00:00Z",
//!   "hasDataSource": true,
//!   "view": { "kind": "summary", "usage": { "totalTokens": 40, "projectCount": 1 } },
//!   "quota": { "windowPercent": 20.0, "windowStatus": "normal" },
//!   "burnRate": { "ratePerHour": 10.0, "hoursToWindowLimit": 4.3 }
//! }
//! ```

use crate::logging::Verbosity;
use crate::models::{GlobalUsage, ProjectUsage, UsageAggregate};
use crate::monitor::{CacheReport, SnapshotView, UsageSnapshot};
use crate::period::ReportZone;
use crate::plan::UsageStatus;
use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::io::{self, Write};

const RULE_WIDTH: usize = 72;
const BAR_WIDTH: usize = 30;

pub struct DisplayManager {
    zone: ReportZone,
    verbosity: Verbosity,
    json: bool,
    json_pretty: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(ReportZone::default(), Verbosity::default())
    }
}

impl DisplayManager {
    pub fn new(zone: ReportZone, verbosity: Verbosity) -> Self {
        Self {
            zone,
            verbosity,
            json: false,
            json_pretty: true,
        }
    }

    pub fn with_json(mut self, json: bool, pretty: bool) -> Self {
        self.json = json;
        self.json_pretty = pretty;
        self
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let output = if self.json_pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        output.context("Failed to serialize output to JSON")
    }

    pub fn render(&self, snapshot: &UsageSnapshot) -> Result<()> {
        if self.json {
            println!("{}", self.to_json(snapshot)?);
            return Ok(());
        }

        self.print_banner(snapshot);

        if !snapshot.has_data_source {
            println!(
                "{} {}",
                "ℹ".bright_blue(),
                "No Claude usage data yet. Conversation logs will appear here once recorded."
                    .bright_white()
            );
            println!();
        }

        match &snapshot.view {
            SnapshotView::Summary { usage } => self.print_summary(usage),
            SnapshotView::Projects { usage } => self.print_projects(usage),
            SnapshotView::Project { usage } => self.print_project(usage),
            SnapshotView::Period {
                label,
                start,
                end,
                usage,
            } => {
                println!(
                    "{} {} ({} → {})",
                    "📅".bright_blue(),
                    label.bright_white().bold(),
                    self.zone.format(*start, "%Y-%m-%d %H:%M"),
                    self.zone.format(*end, "%Y-%m-%d %H:%M")
                );
                self.print_summary(usage);
                if !usage.projects.is_empty() {
                    self.print_projects(usage);
                }
            }
        }

        self.print_quota(snapshot);
        self.print_warnings(snapshot);
        io::stdout().flush().context("Failed to flush output")?;
        Ok(())
    }

    fn print_banner(&self, snapshot: &UsageSnapshot) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        println!("{}", "=".repeat(RULE_WIDTH).bright_cyan());
        println!(
            "{}  {}",
            "Claude Quota Monitor".bright_white().bold(),
            format!(
                "updated {} ({})",
                self.zone.format(snapshot.generated_at, "%Y-%m-%d %H:%M:%S"),
                self.zone
            )
            .dimmed()
        );
        println!("{}", "=".repeat(RULE_WIDTH).bright_cyan());
        println!();
    }

    fn print_summary(&self, usage: &GlobalUsage) {
        println!(
            "{} {} tokens • {} requests • {} projects",
            "📊".bright_yellow(),
            format_number(usage.usage.total_tokens).bright_white().bold(),
            format_number(usage.usage.request_count).bright_white().bold(),
            usage.project_count.to_string().bright_white().bold()
        );
        self.print_breakdown(&usage.usage);
        println!();
    }

    fn print_breakdown(&self, usage: &UsageAggregate) {
        println!(
            "   input {} • output {} • cache write {} • cache read {}",
            format_number(usage.input_tokens).bright_green(),
            format_number(usage.output_tokens).bright_green(),
            format_number(usage.cache_creation_tokens).bright_green(),
            format_number(usage.cache_read_tokens).bright_green()
        );
        if !usage.models.is_empty() {
            let models: Vec<&str> = usage.models.iter().map(String::as_str).collect();
            println!("   models: {}", models.join(", ").bright_cyan());
        }
        if let (Some(start), Some(end)) = (usage.time_range.start, usage.time_range.end) {
            println!(
                "   active: {} → {}",
                self.zone.format(start, "%Y-%m-%d %H:%M"),
                self.zone.format(end, "%Y-%m-%d %H:%M")
            );
        }
    }

    fn print_projects(&self, usage: &GlobalUsage) {
        let projects = usage.projects_by_tokens();
        if projects.is_empty() {
            println!("   {}", "No projects found".dimmed());
            println!();
            return;
        }

        println!("{}", "Projects".bright_white().bold());
        for project in projects {
            let share = if usage.usage.total_tokens > 0 {
                project.usage.total_tokens as f64 / usage.usage.total_tokens as f64 * 100.0
            } else {
                0.0
            };
            println!(
                "   {}: {} tokens ({}%, {} requests, {} conversations)",
                project.display_name().bright_cyan(),
                format_number(project.usage.total_tokens).bright_green(),
                format!("{:.0}", share).bright_yellow(),
                format_number(project.usage.request_count).bright_white(),
                project.conversation_count.to_string().bright_white()
            );
        }
        println!();
    }

    fn print_project(&self, project: &ProjectUsage) {
        println!(
            "{} {} — {} tokens • {} requests • {} conversations",
            "📁".bright_blue(),
            project.display_name().bright_white().bold(),
            format_number(project.usage.total_tokens).bright_green().bold(),
            format_number(project.usage.request_count).bright_white(),
            project.conversation_count.to_string().bright_white()
        );
        self.print_breakdown(&project.usage);
        println!();
    }

    fn print_quota(&self, snapshot: &UsageSnapshot) {
        let quota = &snapshot.quota;
        println!(
            "{} plan {} ({} messages / 5h, {} / day)",
            "⏱".bright_yellow(),
            quota.plan.name.bright_white().bold(),
            quota.plan.limit_per_5h_window,
            quota.plan.daily_limit
        );
        println!(
            "   5h window {} {} ({:.1} / {} messages, {})",
            progress_bar(quota.window_percent, quota.window_status),
            paint(format!("{:>5.1}%", quota.window_percent), quota.window_status),
            quota.window_messages,
            quota.plan.limit_per_5h_window,
            quota.window_status
        );
        println!(
            "   today     {} {} ({})",
            progress_bar(quota.daily_percent, quota.daily_status),
            paint(format!("{:>5.1}%", quota.daily_percent), quota.daily_status),
            quota.daily_status
        );
        if quota.over_daily_limit {
            println!("   {}", "Daily limit exceeded".bright_red().bold());
        }

        match (snapshot.burn_rate.rate_per_hour, snapshot.projected_limit_at) {
            (Some(rate), Some(at)) => println!(
                "   burn rate {} requests/h, window limit at {}",
                format!("{:.1}", rate).bright_white(),
                self.zone.format(at, "%H:%M").bright_yellow()
            ),
            (Some(rate), None) => println!(
                "   burn rate {} requests/h",
                format!("{:.1}", rate).bright_white()
            ),
            (None, _) => println!("   burn rate {}", "n/a".dimmed()),
        }
        println!();
    }

    fn print_warnings(&self, snapshot: &UsageSnapshot) {
        if self.verbosity != Verbosity::Verbose || snapshot.warnings.is_empty() {
            return;
        }
        eprintln!(
            "{} {} lines or files skipped:",
            "⚠".bright_yellow(),
            snapshot.warnings.len()
        );
        for warning in &snapshot.warnings {
            eprintln!("   {}", warning);
        }
    }

    pub fn render_cache_report(&self, report: &CacheReport) -> Result<()> {
        if self.json {
            println!("{}", self.to_json(report)?);
            return Ok(());
        }
        println!("{}", "Parse cache".bright_white().bold());
        println!("   entries:      {}", report.stats.entries.to_string().bright_white());
        println!("   hits:         {}", report.stats.hits.to_string().bright_green());
        println!("   misses:       {}", report.stats.misses.to_string().bright_yellow());
        println!("   evictions:    {}", report.stats.evictions.to_string().bright_yellow());
        println!("   files parsed: {}", report.files_parsed.to_string().bright_white());
        println!("   timeout:      {}s", report.timeout_secs);
        Ok(())
    }

    pub fn render_cache_cleared(&self, dropped: usize) -> Result<()> {
        if self.json {
            let output = serde_json::json!({ "cleared": dropped });
            println!("{}", self.to_json(&output)?);
            return Ok(());
        }
        println!(
            "{} Cleared {} cached files",
            "✓".bright_green(),
            dropped.to_string().bright_white().bold()
        );
        Ok(())
    }

    pub fn hide_cursor(&self) {
        print!("\x1B[?25l");
        let _ = io::stdout().flush();
    }

    pub fn show_cursor(&self) {
        print!("\x1B[?25h");
        let _ = io::stdout().flush();
    }

    pub fn clear_screen(&self) {
        print!("\x1B[2J\x1B[H");
        let _ = io::stdout().flush();
    }
}

fn paint(text: String, status: UsageStatus) -> ColoredString {
    match status {
        UsageStatus::Normal => text.bright_green(),
        UsageStatus::High => text.bright_yellow(),
        UsageStatus::Critical => text.bright_red().bold(),
    }
}

fn progress_bar(percent: f64, status: UsageStatus) -> String {
    let filled = filled_cells(percent, BAR_WIDTH);
    format!(
        "[{}{}]",
        paint("█".repeat(filled), status),
        "░".repeat(BAR_WIDTH - filled).dimmed()
    )
}

fn filled_cells(percent: f64, width: usize) -> usize {
    if !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    let cells = (percent.min(100.0) / 100.0 * width as f64).round() as usize;
    cells.min(width)
}

/// Format a count with thousands separators.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
