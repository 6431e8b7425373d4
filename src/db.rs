use std::path::Path;
use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::ranking::FilmRecord;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Drop and recreate the table.
    #[default]
    Replace,
    /// Refuse to write over a table that already holds rows.
    Fail,
}

pub fn connect(path: &Path) -> Result<Connection, SinkError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| SinkError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

const SCHEMA: &str = "
    CREATE TABLE films (
        rank               INTEGER PRIMARY KEY,
        title              TEXT NOT NULL,
        year               INTEGER,
        budget             INTEGER NOT NULL CHECK(budget > 0),
        revenue            INTEGER NOT NULL CHECK(revenue > 0),
        ratio              REAL NOT NULL,
        rating             REAL,
        production_company TEXT NOT NULL DEFAULT '',
        wiki_url           TEXT,
        abstract           TEXT,
        saved_at           TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX idx_films_title ON films(title);
";

/// Write the enriched set in one transaction, retrying while the database is
/// busy. A failed attempt leaves the previous table untouched.
pub fn save_films(
    conn: &mut Connection,
    films: &[FilmRecord],
    if_exists: IfExists,
) -> Result<usize, SinkError> {
    let mut attempt = 0;
    loop {
        match write_films(conn, films, if_exists) {
            Err(SinkError::Sqlite(e)) if is_busy(&e) && attempt < MAX_RETRIES => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "Database busy (attempt {}/{}), backing off {:.1}s",
                    attempt + 1,
                    MAX_RETRIES,
                    backoff.as_secs_f64()
                );
                thread::sleep(backoff);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn write_films(
    conn: &mut Connection,
    films: &[FilmRecord],
    if_exists: IfExists,
) -> Result<usize, SinkError> {
    let tx = conn.transaction()?;
    if if_exists == IfExists::Fail {
        let rows = existing_rows(&tx)?;
        if rows > 0 {
            return Err(SinkError::TableExists { rows });
        }
    }
    tx.execute_batch("DROP TABLE IF EXISTS films;")?;
    tx.execute_batch(SCHEMA)?;

    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO films
             (rank, title, year, budget, revenue, ratio, rating, production_company, wiki_url, abstract)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for f in films {
            count += stmt.execute(rusqlite::params![
                f.rank as i64, f.title, f.year, f.budget, f.revenue, f.ratio, f.rating,
                f.production_company, f.wiki_url, f.abstract_text,
            ])?;
        }
    }
    tx.commit()?;
    info!("Saved {} films", count);
    Ok(count)
}

fn existing_rows(conn: &Connection) -> Result<i64, SinkError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'films'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT COUNT(*) FROM films", [], |r| r.get(0))?)
}

// ── Overview ──

pub struct OverviewRow {
    pub rank: i64,
    pub title: String,
    pub year: Option<i32>,
    pub ratio: f64,
    pub rating: Option<f64>,
    pub production_company: String,
    pub wiki_url: Option<String>,
}

pub fn fetch_overview(
    conn: &Connection,
    enriched_only: bool,
    limit: usize,
) -> Result<Vec<OverviewRow>, SinkError> {
    let sql = format!(
        "SELECT rank, title, year, ratio, rating, production_company, wiki_url
         FROM films{}
         ORDER BY rank
         LIMIT {}",
        if enriched_only {
            " WHERE wiki_url IS NOT NULL"
        } else {
            ""
        },
        limit
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(OverviewRow {
                rank: row.get(0)?,
                title: row.get(1)?,
                year: row.get(2)?,
                ratio: row.get(3)?,
                rating: row.get(4)?,
                production_company: row.get(5)?,
                wiki_url: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub enriched: usize,
    pub with_year: usize,
    pub with_company: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats, SinkError> {
    if existing_rows(conn)? == 0 {
        return Ok(Stats {
            total: 0,
            enriched: 0,
            with_year: 0,
            with_company: 0,
        });
    }
    let total: usize = conn.query_row("SELECT COUNT(*) FROM films", [], |r| r.get(0))?;
    let enriched: usize = conn.query_row(
        "SELECT COUNT(*) FROM films WHERE wiki_url IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let with_year: usize =
        conn.query_row("SELECT COUNT(*) FROM films WHERE year IS NOT NULL", [], |r| r.get(0))?;
    let with_company: usize = conn.query_row(
        "SELECT COUNT(*) FROM films WHERE production_company != ''",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        enriched,
        with_year,
        with_company,
    })
}
