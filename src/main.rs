mod corpus;
mod correlate;
mod dataset;
mod db;
mod error;
mod ranking;
mod settings;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::corpus::reader::DocumentReader;
use crate::correlate::{CorrelateOptions, CorrelateStats};
use crate::db::IfExists;
use crate::ranking::RankedIndex;
use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "filmwiki",
    about = "Rank films by budget/revenue and enrich the top ones from a Wikipedia abstract dump"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the ranked film index from the financial CSV and print it
    Rank {
        /// Path to movies_metadata.csv
        csv: PathBuf,
        /// Number of films to keep (default: FILMWIKI_TOP_N or 1000)
        #[arg(short = 'n', long)]
        top: Option<usize>,
        /// Max rows to display
        #[arg(long, default_value = "50")]
        show: usize,
    },
    /// Rank, stream the abstract dump for matches, and save the result
    Run {
        /// Path to movies_metadata.csv
        csv: PathBuf,
        /// Path to enwiki-latest-abstract.xml (or .xml.gz)
        corpus: PathBuf,
        /// Number of films to keep (default: FILMWIKI_TOP_N or 1000)
        #[arg(short = 'n', long)]
        top: Option<usize>,
        /// Stop after this many corpus documents
        #[arg(long)]
        limit: Option<u64>,
        /// SQLite database to write (default: FILMWIKI_DB_PATH or data/films.sqlite)
        #[arg(long)]
        db: Option<PathBuf>,
        /// What to do when the films table already exists
        #[arg(long, value_enum)]
        if_exists: Option<IfExists>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show counts from the saved films table
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Saved films overview table
    Overview {
        #[arg(long)]
        db: Option<PathBuf>,
        /// Only films with a Wikipedia match
        #[arg(short, long)]
        enriched: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Serialize)]
struct RunReport {
    rows_read: usize,
    rows_skipped: usize,
    ranked: usize,
    correlation: CorrelateStats,
    enriched_films: usize,
    saved: usize,
    db_path: PathBuf,
    elapsed_secs: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Rank { csv, top, show } => {
            let index = load_index(&csv, top.unwrap_or(settings.top_n))?.0;
            print_ranked(&index, show);
            Ok(())
        }
        Commands::Run {
            csv,
            corpus,
            top,
            limit,
            db,
            if_exists,
            json,
        } => {
            let db_path = db.unwrap_or(settings.db_path.clone());
            let if_exists = if_exists.unwrap_or(settings.if_exists);
            let opts = CorrelateOptions {
                limit,
                progress_every: settings.progress_every,
            };

            // Stage 1: ranking
            let (mut index, load) = load_index(&csv, top.unwrap_or(settings.top_n))?;
            if index.is_empty() {
                warn!("No film has a positive budget and revenue; nothing will match");
            }

            // Stage 2: streaming correlation
            let t_scan = Instant::now();
            let stats = scan_corpus(&corpus, &mut index, &opts)?;
            info!(
                "Scanned {} documents in {}",
                stats.documents_seen,
                format_duration(t_scan.elapsed())
            );

            // Stage 3: persistence
            let enriched_films = index.enriched_count();
            let saved = db::connect(&db_path)
                .and_then(|mut conn| db::save_films(&mut conn, index.films(), if_exists))
                .map_err(|e| {
                    print_correlation(&stats);
                    anyhow::Error::new(e)
                })
                .with_context(|| format!("persistence to {} failed", db_path.display()))?;

            let report = RunReport {
                rows_read: load.rows_read,
                rows_skipped: load.rows_skipped,
                ranked: index.len(),
                correlation: stats,
                enriched_films,
                saved,
                db_path,
                elapsed_secs: t0.elapsed().as_secs_f64(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Commands::Stats { db } => {
            let conn = db::connect(&db.unwrap_or(settings.db_path))?;
            let s = db::get_stats(&conn)?;
            println!("Films:        {}", s.total);
            println!("Enriched:     {}", s.enriched);
            println!("With year:    {}", s.with_year);
            println!("With company: {}", s.with_company);
            Ok(())
        }
        Commands::Overview {
            db,
            enriched,
            limit,
        } => {
            let conn = db::connect(&db.unwrap_or(settings.db_path))?;
            let rows = db::fetch_overview(&conn, enriched, limit)
                .context("no saved films; run 'run' first")?;
            if rows.is_empty() {
                println!("No films found.");
                return Ok(());
            }

            println!(
                "{:>4} | {:<32} | {:>4} | {:>7} | {:>4} | {:<20} | {:<4}",
                "#", "Title", "Year", "Ratio", "Vote", "Company", "Wiki"
            );
            println!("{}", "-".repeat(94));
            for r in &rows {
                println!(
                    "{:>4} | {:<32} | {:>4} | {:>7.4} | {:>4} | {:<20} | {:<4}",
                    r.rank,
                    truncate(&r.title, 32),
                    r.year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
                    r.ratio,
                    r.rating.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".into()),
                    truncate(&r.production_company, 20),
                    if r.wiki_url.is_some() { "yes" } else { "-" },
                );
            }
            println!("\n{} films", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct LoadSummary {
    rows_read: usize,
    rows_skipped: usize,
}

fn load_index(csv: &Path, top_n: usize) -> Result<(RankedIndex, LoadSummary)> {
    let load = dataset::read_rows(csv).context("ranking load failed")?;
    let summary = LoadSummary {
        rows_read: load.rows.len() + load.skipped,
        rows_skipped: load.skipped,
    };
    Ok((RankedIndex::build(load.rows, top_n), summary))
}

fn scan_corpus(
    path: &Path,
    index: &mut RankedIndex,
    opts: &CorrelateOptions,
) -> Result<CorrelateStats> {
    let total_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let pb = ProgressBar::new(total_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let tracked = pb.clone();
    let input = corpus::open(path, move |file: File| -> Box<dyn Read> {
        Box::new(tracked.wrap_read(file))
    })
    .context("streaming correlation failed")?;

    info!("Streaming corpus {} against {} films", path.display(), index.len());
    let result = correlate::correlate(DocumentReader::new(input), index, opts, &pb);
    pb.finish_and_clear();

    match result {
        Ok(stats) => Ok(stats),
        Err(e) => {
            print_correlation(&e.stats);
            Err(anyhow::Error::new(e).context("streaming correlation failed"))
        }
    }
}

fn print_ranked(index: &RankedIndex, show: usize) {
    println!(
        "{:>4} | {:<32} | {:>4} | {:>7} | {:>4} | {:<24}",
        "#", "Title", "Year", "Ratio", "Vote", "Company"
    );
    println!("{}", "-".repeat(90));
    for f in index.films().iter().take(show) {
        println!(
            "{:>4} | {:<32} | {:>4} | {:>7.4} | {:>4} | {:<24}",
            f.rank,
            truncate(&f.title, 32),
            f.year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
            f.ratio,
            f.rating.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".into()),
            truncate(&f.production_company, 24),
        );
    }
    println!("\n{} films ranked (showing {})", index.len(), show.min(index.len()));
}

fn print_correlation(stats: &CorrelateStats) {
    println!(
        "Corpus: {} documents ({} candidates, {} unrepresentable, {} malformed), {} matches, {} enriched.",
        stats.documents_seen,
        stats.candidates,
        stats.unrepresentable,
        stats.malformed,
        stats.matches,
        stats.enriched,
    );
}

fn print_report(report: &RunReport) {
    println!(
        "Films: {} rows read ({} skipped), {} ranked.",
        report.rows_read, report.rows_skipped, report.ranked
    );
    print_correlation(&report.correlation);
    println!(
        "Saved {} films ({} with Wikipedia data) to {}.",
        report.saved,
        report.enriched_films,
        report.db_path.display()
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
