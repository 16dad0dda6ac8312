//! 🚀 cardex-cli — the front door, the bouncer, the maitre d' of cardex.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses args, loads
//! config, sets up logging, and then lets the library do the heavy lifting.
//! Like a manager. 🦆
//!
//! 🧠 Logging goes to `<log_dir>/cardex.log` so the progress bar owns the
//! terminal; user-facing output (summaries, errors, the huge-files table)
//! goes to stdout/stderr directly.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use cardex::{AppConfig, SyncError, load_config, run_download, run_huge, run_sync};

/// 📛 One log file, append mode, no rotation drama.
const LOG_FILE_NAME: &str = "cardex.log";

/// 🗂️ Partition the PEPPOL directory export into per-country XML artifacts.
#[derive(Debug, Parser)]
#[command(name = "cardex", version, about)]
struct Cli {
    #[command(subcommand)]
    action: Action,

    /// Temp directory for the downloaded export
    #[arg(short = 'T', long, global = true)]
    tmp_dir: Option<PathBuf>,

    /// Log directory
    #[arg(short = 'L', long, global = true)]
    log_dir: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Optional TOML config file (flags override it, it overrides CARDEX_* env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Download the export (or reuse it) and partition it by country
    Sync {
        /// Re-download even if the export is already in the tmp dir
        #[arg(short = 'f', long)]
        force: bool,
        /// Rollover threshold per artifact, in bytes
        #[arg(long)]
        max_bytes: Option<u64>,
        /// Keep the tmp dir after a successful sync
        #[arg(long)]
        keep_tmp: bool,
    },
    /// Show the effective configuration and exit
    Check,
    /// Download the export into the tmp dir and stop there
    Download {
        /// Re-download even if the export is already in the tmp dir
        #[arg(short = 'f', long)]
        force: bool,
    },
    /// List the largest artifacts under the extracts dir
    Huge {
        /// How many entries to show
        #[arg(short = 'n', long)]
        number: Option<usize>,
    },
}

/// 🔧 Flags beat file, file beats env, env beats defaults. The natural order.
fn apply_overrides(mut config: AppConfig, cli: &Cli) -> AppConfig {
    if let Some(tmp_dir) = &cli.tmp_dir {
        config.tmp_dir = tmp_dir.clone();
    }
    if let Some(log_dir) = &cli.log_dir {
        config.log_dir = log_dir.clone();
    }
    if cli.verbose {
        config.verbose = true;
    }
    match &cli.action {
        Action::Sync {
            max_bytes,
            keep_tmp,
            ..
        } => {
            if let Some(max_bytes) = max_bytes {
                config.max_bytes = *max_bytes;
            }
            if *keep_tmp {
                config.keep_tmp = true;
            }
        }
        Action::Huge { number } => {
            if let Some(number) = number {
                config.huge_count = *number;
            }
        }
        Action::Check | Action::Download { .. } => {}
    }
    config
}

/// 📡 Point tracing at the log file — the terminal belongs to the progress
/// bar. Falls back to stderr if the log file won't open, because losing the
/// logs entirely would be worse than a slightly messy terminal.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose { "debug" } else { "info" })
    });

    std::fs::create_dir_all(&config.log_dir).ok();
    let log_path = config.log_dir.join(LOG_FILE_NAME);
    let writer = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => BoxMakeWriter::new(std::sync::Mutex::new(file)),
        Err(err) => {
            eprintln!(
                "⚠️  could not open log file '{}' ({err}); logging to stderr instead",
                log_path.display()
            );
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
}

fn two_column_table() -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_summary(summary: &cardex::RunSummary) {
    let mut table = two_column_table();
    for (label, value) in [
        ("cards processed", summary.cards_processed),
        ("countries", summary.countries as u64),
        ("date buckets", summary.date_buckets as u64),
        ("files created", summary.files_created),
    ] {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("\n✅ Sync complete\n{table}");
}

fn print_check(config: &AppConfig) {
    let mut table = two_column_table();
    for (label, value) in [
        ("tmp dir", config.tmp_dir.display().to_string()),
        ("log dir", config.log_dir.display().to_string()),
        ("extracts dir", config.extracts_dir.display().to_string()),
        ("export url", config.export_url.clone()),
        ("max bytes", config.max_bytes.to_string()),
    ] {
        table.add_row(vec![label.to_string(), value]);
    }
    println!("✅ Configuration OK\n{table}");
}

fn print_huge(report: &[cardex::HugeFile]) {
    if report.is_empty() {
        println!("⏳ No artifacts yet — run `cardex sync` first.");
        return;
    }
    let mut table = two_column_table();
    for file in report {
        table.add_row(vec![
            Cell::new(format!("{:.1} MB", file.size as f64 / 1_000_000.0))
                .set_alignment(CellAlignment::Right),
            Cell::new(file.path.display()),
        ]);
    }
    println!("🏋️ Largest artifacts\n{table}");
}

async fn dispatch(action: &Action, config: &AppConfig) -> Result<()> {
    match action {
        Action::Sync { force, .. } => {
            let summary = run_sync(config, *force).await?;
            print_summary(&summary);
        }
        Action::Check => print_check(config),
        Action::Download { force } => {
            let input = run_download(config, *force).await?;
            let size = std::fs::metadata(&input).map(|m| m.len()).unwrap_or(0);
            println!(
                "\n📁 Downloaded file:\n   Location: {}\n   Size: {:.1} MB",
                input.display(),
                size as f64 / 1_000_000.0
            );
        }
        Action::Huge { .. } => print_huge(&run_huge(config)?),
    }
    Ok(())
}

/// 💀 Render the failure and pick the exit code: 130 for a Ctrl-C, 1 for
/// everything else. Printed to stderr, because the logs went to a file and
/// nobody reads a log file before reading their terminal.
fn render_failure(err: &anyhow::Error) -> i32 {
    eprintln!("💀 error: {err}");
    // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        eprintln!("⚠️  cause: {cause}");
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    // -- 📡 if it smells like a connection problem, it's probably a connection problem
    if the_vibes_are_giving_connection_issues {
        eprintln!(
            "🔧 hint: looks like the directory endpoint isn't reachable. \
             Double-check your network, or point `export_url` at a mirror. \
             Even directories need a day off sometimes. ☕"
        );
    }

    if err
        .chain()
        .any(|c| matches!(c.downcast_ref::<SyncError>(), Some(SyncError::Interrupted)))
    {
        eprintln!("\n⚠️  Interrupted by user");
        130
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = match &cli.config {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 Configuration file may not exist, couldn't find it. Double check that it \
                 exists, or maybe, it's an issue with pwd/cwd and relative paths. In that case, \
                 use an absolute path, to be absolutely certain, you are not messing this up. \
                 Was checking here: '{}'",
                path.display()
            ))?;
            if exists {
                Some(path.as_path())
            } else {
                anyhow::bail!(
                    "💀 Config file '{}' does not exist. It exists in our hearts, \
                     but apparently not on disk.",
                    path.display()
                );
            }
        }
        None => None,
    };

    let config = load_config(config_file).context(
        "💀 In cardex-cli, main, we couldn't load the config, take a look at the file and the \
         CARDEX_* environment, make sure it's correct.",
    )?;
    let config = apply_overrides(config, &cli);

    init_logging(&config);
    tracing::info!("cardex {} — action: {:?}", env!("CARGO_PKG_VERSION"), cli.action);

    // 🚀 SEND IT. No take-backs.
    if let Err(err) = dispatch(&cli.action, &config).await {
        let code = render_failure(&err);
        std::process::exit(code);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_arg_grammar_parses() {
        // clap's own debug_assert catches conflicting flags and bad defaults
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn the_one_where_flags_beat_the_config_file() {
        let cli = Cli::parse_from([
            "cardex", "sync", "-T", "/custom/tmp", "-v", "--max-bytes", "42", "--keep-tmp",
        ]);
        let config = apply_overrides(AppConfig::default(), &cli);

        assert_eq!(config.tmp_dir, PathBuf::from("/custom/tmp"));
        assert!(config.verbose);
        assert_eq!(config.max_bytes, 42);
        assert!(config.keep_tmp);
        // untouched knobs keep their configured values
        assert_eq!(config.log_dir, PathBuf::from("log"));
    }

    #[test]
    fn the_one_where_huge_gets_its_own_count() {
        let cli = Cli::parse_from(["cardex", "huge", "-n", "3"]);
        let config = apply_overrides(AppConfig::default(), &cli);
        assert_eq!(config.huge_count, 3);
    }
}
