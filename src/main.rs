use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use claude_quota::cache::ParseCache;
use claude_quota::config::Config;
use claude_quota::display::DisplayManager;
use claude_quota::file_discovery::resolve_base_dir;
use claude_quota::logging::{init_logging, Verbosity};
use claude_quota::monitor::{Monitor, MonitorOptions, ReportKind, SnapshotContext};
use claude_quota::period::Period;
use claude_quota::UsageAnalyzer;
use std::path::PathBuf;
use std::process;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "claude-quota")]
#[command(about = "Track Claude token usage against plan quotas from local conversation logs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Timezone for day, week and month boundaries ("local" or an IANA name)
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Claude config directory; logs are read from its projects/ child
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Plan to measure quota against (pro, max5, max20 or a configured plan)
    #[arg(long, global = true)]
    plan: Option<String>,

    /// Debug logging and parse warnings after each report
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only, no banner
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Render a single report and exit
    #[arg(long, global = true)]
    once: bool,

    /// Output in JSON format (implies --once)
    #[arg(long, global = true)]
    json: bool,

    /// Seconds between refreshes in watch mode
    #[arg(long, global = true)]
    interval: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Account-wide usage and quota status
    Summary,
    /// Usage of a single project
    Project {
        /// Project directory name
        id: String,
    },
    /// Usage broken down by project
    Projects,
    /// Usage since local midnight
    Today,
    /// Usage since Sunday
    Week,
    /// Usage since the first of the month
    Month,
    /// Usage between two dates, inclusive
    Range {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        since: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        until: String,
    },
    /// Inspect or clear the parsed-file cache
    Cache {
        #[command(subcommand)]
        action: Option<CacheAction>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum CacheAction {
    /// Show cache counters after a full scan
    Stats,
    /// Drop every cached file
    Clear,
}

enum Action {
    Report(ReportKind),
    Cache(CacheAction),
}

fn main() {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => handle_error(anyhow::Error::new(e).context("Failed to start async runtime")),
    };
    let result = runtime.block_on(run(cli));
    // A scan interrupted by Ctrl+C may still be running on the blocking pool.
    runtime.shutdown_background();
    if let Err(e) = result {
        handle_error(e);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let action = resolve_action(cli.command.unwrap_or(Commands::Summary))?;

    let mut config = Config::load()?;
    if let Some(timezone) = cli.timezone {
        config.display.timezone = timezone;
    }
    if let Some(plan) = cli.plan {
        config.quota.plan = plan;
    }
    if let Some(interval) = cli.interval {
        config.display.refresh_secs = interval;
    }
    if let Some(dir) = cli.config_dir {
        config.paths.claude_home = Some(dir);
    }
    config.validate()?;

    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    let _guard = init_logging(&config.logging, &config.paths.log_directory, verbosity);

    let zone = config.report_zone()?;
    let plan = config.plan()?;
    let tracker = config.quota_tracker()?;
    let base_dir = resolve_base_dir(config.paths.claude_home.as_deref());
    info!(base_dir = %base_dir.display(), plan = %plan.name, timezone = %zone, "Starting");

    let context = SnapshotContext {
        analyzer: UsageAnalyzer::with_cache(base_dir, ParseCache::new(config.cache_timeout())),
        plan,
        tracker,
        zone,
        window: Duration::hours(config.quota.window_hours),
    };
    let display = DisplayManager::new(zone, verbosity).with_json(cli.json, config.display.json_pretty);

    match action {
        Action::Report(kind) => {
            let options = MonitorOptions {
                once: cli.once || cli.json,
                interval: config.refresh_interval(),
            };
            debug!(command = kind.name(), once = options.once, "Running report");
            Monitor::new(context, display, options).run(kind).await
        }
        Action::Cache(CacheAction::Stats) => display.render_cache_report(&context.cache_report()),
        Action::Cache(CacheAction::Clear) => display.render_cache_cleared(context.clear_cache()),
    }
}

fn resolve_action(command: Commands) -> Result<Action> {
    let kind = match command {
        Commands::Summary => ReportKind::Summary,
        Commands::Project { id } => ReportKind::Project(id),
        Commands::Projects => ReportKind::Projects,
        Commands::Today => ReportKind::Period(Period::Today),
        Commands::Week => ReportKind::Period(Period::Week),
        Commands::Month => ReportKind::Period(Period::Month),
        Commands::Range { since, until } => {
            let since = parse_date(&since, "since")?;
            let until = parse_date(&until, "until")?;
            if since > until {
                bail!("--since {} is after --until {}", since, until);
            }
            ReportKind::Period(Period::Custom { since, until })
        }
        Commands::Cache { action } => {
            return Ok(Action::Cache(action.unwrap_or(CacheAction::Stats)));
        }
    };
    Ok(Action::Report(kind))
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date format: {}. Use YYYY-MM-DD", flag, value))
}

fn handle_error(e: anyhow::Error) -> ! {
    eprintln!("Error: {:#}", e);
    process::exit(1);
}
