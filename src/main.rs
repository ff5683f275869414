//! CLI entry point for `maildirsync`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use maildirsync::config::{self, Config};
use maildirsync::maildir::flags::MaildirFlags;
use maildirsync::model::record::MailRecord;
use maildirsync::parser::envelope::MailParserExtractor;
use maildirsync::report;
use maildirsync::store::{RecordFilter, RecordStore, SqliteStore};
use maildirsync::sync::{self, IngestOutcome, SyncReport};

#[derive(Parser)]
#[command(
    name = "maildirsync",
    version,
    about = "Mirror a maildir directory into a SQLite database"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database file (overrides `store.database` in the config)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress per-message progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingest + reconcile pass over a mail directory
    Sync {
        dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List stored messages, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Show one stored message with its body
    Show {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Change a flag on a maildir file by renaming it
    Flag {
        file: PathBuf,
        #[command(flatten)]
        change: FlagChange,
        /// Print the new name without renaming
        #[arg(long)]
        dry_run: bool,
    },
    /// Export stored messages to CSV
    Export {
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args)]
struct FilterArgs {
    /// Only messages without the seen flag
    #[arg(long, conflicts_with = "seen")]
    unseen: bool,
    /// Only messages with the seen flag
    #[arg(long)]
    seen: bool,
    /// Only flagged messages
    #[arg(long)]
    flagged: bool,
    /// Only replied messages
    #[arg(long)]
    replied: bool,
    /// Substring of the subject or sender
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,
    /// Maximum number of messages
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

impl FilterArgs {
    fn to_filter(&self) -> RecordFilter {
        let seen = match (self.seen, self.unseen) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        RecordFilter {
            seen,
            flagged: self.flagged,
            replied: self.replied,
            search: self.search.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct FlagChange {
    /// Add a flag
    #[arg(long, value_name = "C")]
    set: Option<String>,
    /// Flip a flag
    #[arg(long, value_name = "C")]
    toggle: Option<String>,
    /// Remove a flag
    #[arg(long, value_name = "C")]
    unset: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let db = cli.db;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Sync { dir, json } => cmd_sync(&dir, json, quiet, db, &config),
        Commands::List { filter, json } => cmd_list(&filter.to_filter(), json, db, &config),
        Commands::Show { path, json } => cmd_show(&path, json, db, &config),
        Commands::Stats { json } => cmd_stats(json, db, &config),
        Commands::Flag {
            file,
            change,
            dry_run,
        } => cmd_flag(&file, &change, dry_run),
        Commands::Export { output, filter } => cmd_export(&output, &filter.to_filter(), db, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "maildirsync.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn open_store(db: Option<PathBuf>, config: &Config) -> anyhow::Result<SqliteStore> {
    let path = config::database_path(config, db);
    SqliteStore::open(&path).with_context(|| format!("opening database {}", path.display()))
}

/// Run one synchronization pass and print its summary.
fn cmd_sync(
    dir: &Path,
    json: bool,
    quiet: bool,
    db: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    // Fail on a bad root before the database file is created.
    maildirsync::maildir::scanner::check_root(dir)?;
    let store = open_store(db, config)?;
    let extractor = MailParserExtractor::new(config.sync.max_message_size);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Syncing [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );
    if quiet || json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let start = Instant::now();
    let progress = |current: usize, total: usize, path: &Path, outcome: IngestOutcome| {
        pb.set_length(total as u64);
        pb.set_position(current as u64);
        if !quiet && !json {
            pb.println(format!("  {:<12} {}", outcome.label(), path.display()));
        }
    };

    let report = sync::run_pass(
        dir,
        &store,
        &extractor,
        config.sync.scan_options(),
        Some(&progress),
    )?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sync_table(dir, &report, start.elapsed());
    }
    Ok(())
}

fn print_sync_table(dir: &Path, report: &SyncReport, elapsed: std::time::Duration) {
    println!();
    println!("  {:<20} {}", "Directory", dir.display());
    println!("  {:<20} {}", "Scanned", report.scanned);
    println!("  {:<20} {}", "Ingested", report.ingested);
    println!("  {:<20} {}", "Skipped", report.skipped);
    println!("  {:<20} {}", "Deleted", report.deleted);
    if report.delete_failures > 0 {
        println!("  {:<20} {}", "Failed deletes", report.delete_failures);
    }
    if report.unverified > 0 {
        println!("  {:<20} {}", "Kept (unreadable)", report.unverified);
    }
    println!("  {:<20} {:.2?}", "Elapsed", elapsed);
    println!();
}

/// List stored records as a table or JSON.
fn cmd_list(
    filter: &RecordFilter,
    json: bool,
    db: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let store = open_store(db, config)?;
    let records = store.list(filter)?;

    if json {
        let items: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path,
                    "date": r.date.to_rfc3339(),
                    "from": r.from,
                    "to": r.to,
                    "subject": r.subject,
                    "seen": r.is_seen,
                    "replied": r.is_replied,
                    "flagged": r.is_flagged,
                })
            })
            .collect();
        let output = serde_json::json!({
            "count": records.len(),
            "messages": items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {} message(s)", records.len());
    println!();
    if records.is_empty() {
        return Ok(());
    }

    println!(
        "  {:<4} {:<17} {:<5} {:<25} {:<40}",
        "#", "Date", "Flags", "From", "Subject"
    );
    println!("  {}", "-".repeat(95));

    for (i, record) in records.iter().enumerate() {
        let date = format_date(record, &config.general.date_format);
        let from_trunc: String = record.from.chars().take(24).collect();
        let subj_trunc: String = record.subject.chars().take(39).collect();
        println!(
            "  {:<4} {:<17} {:<5} {:<25} {:<40}",
            i + 1,
            date,
            record.flag_summary(),
            from_trunc,
            subj_trunc
        );
    }
    println!();
    Ok(())
}

/// Format with the configured pattern, falling back to the default on a bad pattern.
fn format_date(record: &MailRecord, pattern: &str) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    if write!(out, "{}", record.date.format(pattern)).is_err() {
        return record.date.format("%Y-%m-%d %H:%M").to_string();
    }
    out
}

/// Show one record by path.
fn cmd_show(path: &Path, json: bool, db: Option<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let store = open_store(db, config)?;
    let record = find_record(&store, path)?
        .with_context(|| format!("no stored message for {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Path:         {}", record.path);
    println!("Date:         {}", record.date.to_rfc2822());
    println!("From:         {}", record.from);
    println!("To:           {}", record.to);
    if !record.delivered_to.is_empty() {
        println!("Delivered-To: {}", record.delivered_to);
    }
    println!("Subject:      {}", record.subject);
    println!("Flags:        {}", record.flag_summary());
    println!();
    println!("{}", record.body);
    Ok(())
}

/// Look the path up as given, then in its canonical form.
fn find_record(store: &SqliteStore, path: &Path) -> anyhow::Result<Option<MailRecord>> {
    let key = maildirsync::maildir::scanner::path_key(path);
    if let Some(record) = store.find_by_path(&key)? {
        return Ok(Some(record));
    }
    match std::fs::canonicalize(path) {
        Ok(canonical) => {
            let key = maildirsync::maildir::scanner::path_key(&canonical);
            Ok(store.find_by_path(&key)?)
        }
        Err(_) => Ok(None),
    }
}

/// Show statistics for the store.
fn cmd_stats(json: bool, db: Option<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let db_path = config::database_path(config, db.clone());
    let store = open_store(db, config)?;
    let records = store.all_records()?;
    let stats = report::summarize(&records);
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        let top_json: Vec<serde_json::Value> = stats
            .top_senders
            .iter()
            .map(|(sender, count)| {
                serde_json::json!({
                    "sender": sender,
                    "count": count,
                })
            })
            .collect();
        let date_range = stats.oldest.zip(stats.newest).map(|(min, max)| {
            serde_json::json!({
                "oldest": min.to_rfc3339(),
                "newest": max.to_rfc3339(),
            })
        });
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "database_size": db_size,
            "message_count": stats.total,
            "seen": stats.seen,
            "unseen": stats.unseen(),
            "replied": stats.replied,
            "flagged": stats.flagged,
            "body_bytes": stats.body_bytes,
            "date_range": date_range,
            "top_senders": top_json,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<20} {}", "Database", db_path.display());
    println!("  {:<20} {}", "Database size", format_size(db_size, BINARY));
    println!("  {:<20} {}", "Messages", stats.total);
    println!("  {:<20} {}", "Unseen", stats.unseen());
    println!("  {:<20} {}", "Replied", stats.replied);
    println!("  {:<20} {}", "Flagged", stats.flagged);
    println!(
        "  {:<20} {}",
        "Body text",
        format_size(stats.body_bytes, BINARY)
    );
    if let (Some(min), Some(max)) = (stats.oldest, stats.newest) {
        println!(
            "  {:<20} {} to {}",
            "Date range",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        );
    }

    if !stats.top_senders.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &stats.top_senders {
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
    Ok(())
}

/// Rename a maildir file so its name carries the requested flag change.
fn cmd_flag(file: &Path, change: &FlagChange, dry_run: bool) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("not a file: {}", file.display());
    }

    let mut flags = MaildirFlags::parse(file.to_string_lossy().into_owned());
    if let Some(ref code) = change.set {
        flags.set_flag(code)?;
    } else if let Some(ref code) = change.toggle {
        flags.toggle_flag(code)?;
    } else if let Some(ref code) = change.unset {
        flags.remove_flag(code)?;
    }

    let target = PathBuf::from(flags.path());
    if target == file {
        println!("  unchanged: {}", file.display());
        return Ok(());
    }

    if dry_run {
        println!("  {} -> {}", file.display(), target.display());
        return Ok(());
    }

    if target.exists() {
        anyhow::bail!("refusing to overwrite {}", target.display());
    }
    std::fs::rename(file, &target)
        .with_context(|| format!("renaming {} to {}", file.display(), target.display()))?;
    tracing::info!(from = %file.display(), to = %target.display(), "Renamed");
    println!("  {}", target.display());
    Ok(())
}

/// Export filtered records to a CSV file.
fn cmd_export(
    output: &Path,
    filter: &RecordFilter,
    db: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let store = open_store(db, config)?;
    let records = store.list(filter)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    maildirsync::export::csv::export_csv(&records, output)?;
    println!(
        "  Exported {} message(s) to {}",
        records.len(),
        output.display()
    );
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "maildirsync", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
