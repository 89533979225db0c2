use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;

use bisync::Config;

/// Bidirectional reconciliation between two directory trees.
#[derive(Parser)]
#[command(name = "bi", version, about = "Two-endpoint directory reconciliation that never silently picks a winner")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the JSON config document (falls back to $BISYNC_CONFIG if omitted).
    ///
    /// Required unless a subcommand is given.
    #[arg(env = "BISYNC_CONFIG", required = false)]
    config: Option<PathBuf>,

    /// Path to the snapshot file this cycle reads and rewrites.
    #[arg(long, default_value = ".bisync-snapshot.json")]
    snapshot: PathBuf,

    /// Show what would happen without touching either root, overriding the config's dry_run.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Apply changes even if the config defaults to dry_run.
    #[arg(long, conflicts_with = "dry_run")]
    apply: bool,

    /// Quiet mode: only print a final one-line summary.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Remove quarantined (`.deleted/`) files older than a cutoff, on both roots.
    PurgeQuarantine {
        /// Path to the JSON config document (falls back to $BISYNC_CONFIG if omitted).
        #[arg(env = "BISYNC_CONFIG")]
        config: PathBuf,

        /// Remove entries soft-deleted more than this many days ago.
        #[arg(long, default_value_t = 30)]
        older_than_days: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "bisync=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .init();

    match run(cli) {
        Ok(had_failures) => process::exit(i32::from(had_failures)),
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            process::exit(1);
        }
    }
}

/// Returns `true` if the reconcile cycle recorded action failures, or hit
/// the one fatal failure the core itself can raise: the post-cycle snapshot
/// write (spec §4.4/§7). Per-action failures downgrade a cycle to
/// "completed with errors" without being fatal; a failed snapshot write is
/// fatal regardless of whether every action otherwise succeeded, since the
/// next cycle would silently reconcile against a stale base. Either way a
/// host program wants a non-zero exit to notice. Maintenance subcommands
/// always return `false`.
fn run(cli: Cli) -> Result<bool> {
    if let Some(Command::PurgeQuarantine { config, older_than_days }) = cli.command {
        return run_purge_quarantine(&config, older_than_days, cli.quiet).map(|()| false);
    }

    let config_path = cli.config.context("a config path is required (positional argument or $BISYNC_CONFIG)")?;
    let bytes = std::fs::read(&config_path)
        .with_context(|| format!("reading config from {}", config_path.display()))?;
    let mut config: Config =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", config_path.display()))?;

    if cli.dry_run {
        config.dry_run = true;
    } else if cli.apply {
        config.dry_run = false;
    }

    if !config.left_root.exists() {
        anyhow::bail!("left_root does not exist: {}", config.left_root.display());
    }
    if !config.right_root.exists() {
        anyhow::bail!("right_root does not exist: {}", config.right_root.display());
    }

    let report = bisync::reconcile_cycle(&config, &cli.snapshot);

    if !cli.quiet {
        print_summary(&report, config.dry_run);
    }

    Ok(report.is_fatal() || report.completed_with_errors())
}

fn run_purge_quarantine(config_path: &std::path::Path, older_than_days: u64, quiet: bool) -> Result<()> {
    let bytes = std::fs::read(config_path)
        .with_context(|| format!("reading config from {}", config_path.display()))?;
    let config: Config =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing config {}", config_path.display()))?;

    let cutoff = std::time::SystemTime::now() - std::time::Duration::from_secs(older_than_days * 86_400);
    let left_removed = bisync::quarantine::purge_older_than(&config.left_root, cutoff)
        .with_context(|| format!("purging quarantine under {}", config.left_root.display()))?;
    let right_removed = bisync::quarantine::purge_older_than(&config.right_root, cutoff)
        .with_context(|| format!("purging quarantine under {}", config.right_root.display()))?;

    if !quiet {
        println!(
            "{} {left_removed} on left, {right_removed} on right (older than {older_than_days}d)",
            "purged:".green().bold()
        );
    }

    Ok(())
}

fn print_summary(report: &bisync::CycleReport, dry_run: bool) {
    let verb = if dry_run { "would apply" } else { "applied" };

    if report.actions_planned == 0 {
        println!("{}", "in sync".green());
    } else {
        println!(
            "{} {verb} ({} planned, {} failed)",
            "done.".green().bold(),
            report.actions_planned,
            report.failed
        );
    }

    if let Some(err) = &report.snapshot_error {
        println!("  {} {err}", "fatal:".red().bold());
    }

    for alert in &report.conflict_alerts {
        println!(
            "  {} {} [{}] -> {}",
            "conflict:".yellow(),
            alert.path,
            alert.kind.as_str(),
            alert.resolution
        );
    }

    for alert in &report.error_alerts {
        println!("  {} {} ({}): {}", "failed:".red(), alert.path, alert.kind, alert.message);
    }
}
