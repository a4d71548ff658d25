//! Top-level CLI definition and dispatch.

use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::Parser;
use colored::{Colorize, control};
use serde_json::Value;
use thiserror::Error;

use mediaqueue::core::config::Config;
use mediaqueue::core::errors::MqError;
use mediaqueue::core::units::{format_bytes, parse_size};
use mediaqueue::logger::activity::ActivityLogger;
use mediaqueue::logger::jsonl::JsonlConfig;
use mediaqueue::queue::listing::Layout;
use mediaqueue::queue::ordering::OrderKey;
use mediaqueue::queue::planner::Direction;
use mediaqueue::queue::reconciler::{ReconcileConfig, ReconcileReport, Reconciler};
use mediaqueue::queue::transfer::TransferStrategy;

/// mediaqueue: keeps a bounded active directory filled from an offload directory.
#[derive(Debug, Parser)]
#[command(
    name = "mediaqueue",
    author,
    version,
    about = "Keep a count- or size-bounded active directory filled from an offload directory",
    long_about = None
)]
pub struct Cli {
    /// Bounded directory consumed by the user (default: `[dirs] active` in config).
    #[arg(value_name = "ACTIVE_DIR")]
    active: Option<PathBuf>,
    /// Unbounded overflow directory (default: `[dirs] offload` in config).
    #[arg(value_name = "OFFLOAD_DIR")]
    offload: Option<PathBuf>,
    /// Maximum number of files in the active directory.
    #[arg(short = 'n', long, value_name = "N")]
    max_count: Option<usize>,
    /// Maximum total size of the active directory (e.g. 500, 10m, 4G, 1.5g).
    #[arg(short = 's', long, value_name = "SIZE")]
    max_bytes: Option<String>,
    /// Number of files always admitted regardless of size.
    #[arg(short = 'm', long, value_name = "N")]
    min_count: Option<usize>,
    /// Maximum number of active files per group (grouped layout).
    #[arg(short = 'g', long = "per-group", value_name = "N")]
    per_group: Option<usize>,
    /// Directory layout: flat or grouped.
    #[arg(long, value_name = "LAYOUT")]
    layout: Option<String>,
    /// Ordering key: name or mtime.
    #[arg(long, value_name = "KEY")]
    order: Option<String>,
    /// Always copy then delete instead of renaming.
    #[arg(long)]
    copy: bool,
    /// Verify cross-device copies with SHA-256 before deleting the source.
    #[arg(long)]
    verify: bool,
    /// Print the plan without moving anything.
    #[arg(long)]
    dry_run: bool,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// JSONL activity log path.
    #[arg(long, value_name = "PATH", conflicts_with = "no_log")]
    log: Option<PathBuf>,
    /// Do not write the activity log.
    #[arg(long)]
    no_log: bool,
    /// Force JSON output mode.
    #[arg(long)]
    json: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (problems only).
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<MqError> for CliError {
    fn from(err: MqError) -> Self {
        match err {
            MqError::InvalidConfig { .. }
            | MqError::MissingConfig { .. }
            | MqError::ConfigParse { .. }
            | MqError::DirectoryNotFound { .. } => Self::User(err.to_string()),
            MqError::Serialization { .. } => Self::Internal(err.to_string()),
            MqError::PermissionDenied { .. }
            | MqError::NameConflict { .. }
            | MqError::MoveFailed { .. }
            | MqError::Io { .. }
            | MqError::VerificationFailed { .. } => Self::Runtime(err.to_string()),
        }
    }
}

/// Run one reconciliation pass. Per-file conflicts and failures are reported
/// but do not make the run fail.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    let mut cfg = Config::load(cli.config.as_deref())?;
    apply_cli_overrides(cli, &mut cfg)?;

    let active = cli
        .active
        .clone()
        .or_else(|| cfg.dirs.active.clone())
        .ok_or_else(|| {
            CliError::User("missing ACTIVE_DIR (pass it or set [dirs] active)".to_string())
        })?;
    let offload = cli
        .offload
        .clone()
        .or_else(|| cfg.dirs.offload.clone())
        .ok_or_else(|| {
            CliError::User("missing OFFLOAD_DIR (pass it or set [dirs] offload)".to_string())
        })?;

    let mut reconcile_config = ReconcileConfig::from_config(&cfg, active, offload)?;
    reconcile_config.dry_run = cli.dry_run;

    let logger = (cfg.logging.enabled && !cli.no_log).then(|| {
        ActivityLogger::open(JsonlConfig {
            path: cfg.logging.jsonl_log.clone(),
            fallback_path: Some(std::env::temp_dir().join("mediaqueue-activity.jsonl")),
            max_size_bytes: cfg.logging.max_size_bytes,
            max_rotated_files: cfg.logging.max_rotated_files,
        })
    });

    let mut reconciler =
        Reconciler::new(reconcile_config, logger).with_config_hash(cfg.stable_hash().ok());
    let report = reconciler.run()?;

    match output_mode(cli) {
        OutputMode::Human => print_human(cli, &report),
        OutputMode::Json => {
            let payload = serde_json::to_value(&report)?;
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

/// CLI flags take precedence over env and file values.
fn apply_cli_overrides(cli: &Cli, cfg: &mut Config) -> Result<(), CliError> {
    if let Some(n) = cli.max_count {
        cfg.budget.max_count = Some(n);
    }
    if let Some(raw) = &cli.max_bytes {
        cfg.budget.max_bytes = Some(parse_size(raw)?);
    }
    if let Some(n) = cli.min_count {
        cfg.budget.min_count = n;
    }
    if let Some(n) = cli.per_group {
        cfg.budget.per_group_count = Some(n);
    }
    if let Some(raw) = &cli.layout {
        cfg.listing.layout = raw.parse::<Layout>()?;
    }
    if let Some(raw) = &cli.order {
        cfg.listing.order = raw.parse::<OrderKey>()?;
    }
    if cli.copy {
        cfg.transfer.strategy = TransferStrategy::Copy;
    }
    if cli.verify {
        cfg.transfer.verify_checksum = true;
    }
    if let Some(path) = &cli.log {
        cfg.logging.enabled = true;
        cfg.logging.jsonl_log.clone_from(path);
    }
    Ok(())
}

fn print_human(cli: &Cli, report: &ReconcileReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    if !cli.quiet {
        for outcome in &report.offloaded {
            println!("{prefix}Offloading: {}", outcome.name);
        }
        for outcome in &report.activated {
            println!("{prefix}Activating: {}", outcome.name);
        }
    }

    for conflict in &report.conflicts {
        let destination = match conflict.direction {
            Direction::Offload => &report.offload_dir,
            Direction::Activate => &report.active_dir,
        };
        eprintln!(
            "{} {} already exists in {}, skipped",
            "Conflict:".yellow(),
            conflict.name,
            destination.display()
        );
    }
    for failure in &report.failures {
        eprintln!("{} {}: {}", "Failed:".red(), failure.name, failure.message);
    }
    for name in &report.deferred {
        eprintln!(
            "{} {name}: no room left after a failed offload",
            "Deferred:".yellow()
        );
    }

    if cli.quiet {
        return;
    }
    if !report.moved_anything() && report.is_clean() {
        println!("Nothing to do.");
    }
    println!("{}", summary_line(report));
    if cli.verbose {
        println!(
            "  kept {} file(s) in place; finished in {} ms",
            report.kept, report.duration_ms
        );
    }
}

fn summary_line(report: &ReconcileReport) -> String {
    let verb = if report.dry_run { "would leave" } else { "now holds" };
    let mut line = format!(
        "Offloaded {} ({}), activated {} ({}); active {verb} {} file(s), {}",
        report.offloaded.len(),
        format_bytes(report.bytes_moved(Direction::Offload)),
        report.activated.len(),
        format_bytes(report.bytes_moved(Direction::Activate)),
        report.active_count,
        format_bytes(report.active_bytes),
    );
    let problems = report.conflicts.len() + report.failures.len() + report.deferred.len();
    if problems > 0 {
        let _ = write!(line, "; {problems} problem(s) reported");
    }
    line
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("MQ_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
