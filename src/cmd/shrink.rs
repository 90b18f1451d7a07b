//! CLI handler for the shrink command.

use super::parse_list;
use crate::config::ShrinkConfig;
use crate::database::{Database, DuckDbDatabase};
use crate::error::ShrinkError;
use crate::shrinker::ShrinkStats;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Args, Debug)]
pub struct ShrinkArgs {
    /// DuckDB database file to shrink in place
    pub database: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Rows per batch (overrides the config file)
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Seed for random redaction strategies (overrides the config file)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only process these tables (comma-separated)
    #[arg(short, long)]
    pub tables: Option<String>,

    /// Skip these tables (comma-separated)
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// Run filters and removals only
    #[arg(long, conflicts_with = "sanitize_only")]
    pub filter_only: bool,

    /// Run sanitizers only
    #[arg(long, conflicts_with = "filter_only")]
    pub sanitize_only: bool,

    /// Run against a temporary copy and report what would change
    #[arg(long)]
    pub dry_run: bool,

    /// Output statistics as JSON
    #[arg(long)]
    pub json: bool,

    /// Show progress during processing
    #[arg(short, long)]
    pub progress: bool,
}

pub fn run(args: ShrinkArgs) -> anyhow::Result<()> {
    if !args.database.exists() {
        anyhow::bail!("database file does not exist: {}", args.database.display());
    }

    let config = ShrinkConfig::load(&args.config)?;
    let batch_size = args.batch_size.unwrap_or_else(|| config.batch_size());
    let seed = config.resolve_seed(args.seed);

    // Keep the temporary copy alive until the run is over
    let (_workdir, path) = if args.dry_run {
        let dir = tempfile::tempdir()?;
        let copy = copy_database(&args.database, dir.path())?;
        (Some(dir), copy)
    } else {
        (None, args.database.clone())
    };

    if !args.json {
        eprintln!(
            "Shrinking database: {}{} [batch size: {}, seed: {}]",
            args.database.display(),
            if args.dry_run { " (dry run)" } else { "" },
            batch_size,
            seed
        );
    }

    let db = DuckDbDatabase::open(&path, batch_size)?;
    check_tables_exist(&db, &config)?;

    let database: Rc<dyn Database> = Rc::new(db);
    let shrinker = config.build(Some(database), seed)?;

    let pb = if args.progress && !args.json {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let mut shrinker = match &pb {
        Some(pb) => {
            let pb = pb.clone();
            shrinker.with_progress(move |table, pass| pb.set_message(format!("{} {}", pass, table)))
        }
        None => shrinker,
    };
    shrinker.select_tables(
        args.tables.as_deref().map(|t| parse_list(Some(t))),
        parse_list(args.exclude.as_deref()),
    );

    let start_time = Instant::now();
    let stats = if args.filter_only {
        shrinker.filter()?
    } else if args.sanitize_only {
        shrinker.sanitize()?
    } else {
        shrinker.shrink()?
    };
    let elapsed = start_time.elapsed();

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }
    info!(elapsed_ms = elapsed.as_millis() as u64, "run finished");

    output_stats(&stats, args.json, args.dry_run, elapsed)
}

/// Copy a database file (and its write-ahead log) into `dir`
fn copy_database(source: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("not a file: {}", source.display()))?;
    let target = dir.join(file_name);
    std::fs::copy(source, &target)?;

    let mut wal = source.as_os_str().to_owned();
    wal.push(".wal");
    let wal = PathBuf::from(wal);
    if wal.exists() {
        let mut target_wal = target.as_os_str().to_owned();
        target_wal.push(".wal");
        std::fs::copy(&wal, PathBuf::from(target_wal))?;
    }

    Ok(target)
}

/// Fail before touching anything if a configured table is missing
fn check_tables_exist(db: &DuckDbDatabase, config: &ShrinkConfig) -> anyhow::Result<()> {
    let existing = db.table_names()?;
    let referenced = config.tables.iter().flat_map(|(name, table)| {
        std::iter::once(name.as_str()).chain(table.subtables.iter().map(|s| s.table.as_str()))
    });

    for name in referenced {
        if !existing.iter().any(|t| t == name) {
            return Err(ShrinkError::UnknownTable(name.to_string()).into());
        }
    }
    Ok(())
}

fn output_stats(
    stats: &ShrinkStats,
    json: bool,
    dry_run: bool,
    elapsed: Duration,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }

    eprintln!();
    if dry_run {
        eprintln!("Dry run complete (no changes written):");
    } else {
        eprintln!("Shrink complete:");
    }
    eprintln!("  Tables processed: {}", stats.tables_processed);
    eprintln!("  Tables removed: {}", stats.tables_removed);
    eprintln!("  Rows removed: {}", stats.rows_removed);
    eprintln!("  Rows removed by cascade: {}", stats.rows_cascaded);
    eprintln!("  Rows sanitized: {}", stats.rows_sanitized);
    eprintln!("  Time: {:.3?}", elapsed);

    if !stats.table_stats.is_empty() {
        eprintln!();
        eprintln!("  Per table:");
        for table in &stats.table_stats {
            let what = if table.removed_table {
                format!("{} removed (table)", table.rows_removed)
            } else {
                format!(
                    "{} removed, {} cascaded, {} sanitized",
                    table.rows_removed, table.rows_cascaded, table.rows_sanitized
                )
            };
            eprintln!("    - {}: {}", table.name, what);
        }
    }

    if !stats.tables_skipped.is_empty() {
        eprintln!();
        eprintln!("  Skipped: {}", stats.tables_skipped.join(", "));
    }

    Ok(())
}
