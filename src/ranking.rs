use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use crate::corpus::title::TitleKey;
use crate::dataset::RawFilmRow;

pub const DEFAULT_TOP_N: usize = 1000;

// `'name': 'Pixar'` as written by Python's repr, or `"name": "Pixar"` as JSON.
static COMPANY_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]name['"]\s*:\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#).unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub struct FilmRecord {
    pub rank: usize,
    pub title: String,
    pub budget: i64,
    pub revenue: i64,
    pub ratio: f64,
    pub rating: Option<f64>,
    pub year: Option<i32>,
    pub production_company: String,
    pub wiki_url: Option<String>,
    pub abstract_text: Option<String>,
}

impl FilmRecord {
    pub fn is_enriched(&self) -> bool {
        self.wiki_url.is_some()
    }
}

/// The top-N films by ratio plus the two lookups the correlator joins on.
/// Membership is fixed once built; only the enrichment fields change.
#[derive(Debug, Default)]
pub struct RankedIndex {
    films: Vec<FilmRecord>,
    by_title_year: HashMap<(String, i32), usize>,
    by_title: HashMap<String, usize>,
}

impl RankedIndex {
    pub fn build<I>(rows: I, top_n: usize) -> Self
    where
        I: IntoIterator<Item = RawFilmRow>,
    {
        let mut total = 0usize;
        let mut candidates: Vec<FilmRecord> = rows
            .into_iter()
            .filter_map(|row| {
                total += 1;
                film_from_row(row)
            })
            .collect();

        let valid = candidates.len();
        // Stable, so equal ratios keep dataset order.
        candidates.par_sort_by(|a, b| a.ratio.total_cmp(&b.ratio));
        candidates.truncate(top_n);

        let mut index = RankedIndex {
            films: Vec::with_capacity(candidates.len()),
            by_title_year: HashMap::with_capacity(candidates.len()),
            by_title: HashMap::with_capacity(candidates.len()),
        };
        for (slot, mut film) in candidates.into_iter().enumerate() {
            film.rank = slot + 1;
            if let Some(year) = film.year {
                index
                    .by_title_year
                    .entry((film.title.clone(), year))
                    .or_insert(slot);
            }
            index.by_title.entry(film.title.clone()).or_insert(slot);
            index.films.push(film);
        }

        info!(
            "Ranked {} of {} valid film rows ({} rows read, top {})",
            index.films.len(),
            valid,
            total,
            top_n
        );
        index
    }

    pub fn films(&self) -> &[FilmRecord] {
        &self.films
    }

    pub fn len(&self) -> usize {
        self.films.len()
    }

    pub fn is_empty(&self) -> bool {
        self.films.is_empty()
    }

    /// A dated key only consults the (title, year) map; a year-less key only
    /// the title map. There is no fallback between the two.
    pub fn lookup(&self, key: &TitleKey) -> Option<usize> {
        match key.year {
            Some(year) => self
                .by_title_year
                .get(&(key.title.clone(), year))
                .copied(),
            None => self.by_title.get(&key.title).copied(),
        }
    }

    pub fn get(&self, slot: usize) -> Option<&FilmRecord> {
        self.films.get(slot)
    }

    /// Set-if-absent: writes `wiki_url` and `abstract_text` only when the
    /// record has not been enriched yet. Returns whether it wrote.
    pub fn enrich(&mut self, slot: usize, url: &str, abstract_text: &str) -> bool {
        match self.films.get_mut(slot) {
            Some(film) if !film.is_enriched() => {
                film.wiki_url = Some(url.to_string());
                film.abstract_text = Some(abstract_text.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn enriched_count(&self) -> usize {
        self.films.iter().filter(|f| f.is_enriched()).count()
    }
}

fn film_from_row(row: RawFilmRow) -> Option<FilmRecord> {
    let title = row.title.trim();
    if title.is_empty() {
        return None;
    }
    let budget = parse_amount(&row.budget)?;
    let revenue = parse_amount(&row.revenue)?;
    if budget <= 0 || revenue <= 0 {
        return None;
    }

    let year = parse_year(&row.release_date);
    if year.is_none() && !row.release_date.trim().is_empty() {
        debug!("Unparsable release date {:?} for {}", row.release_date, title);
    }

    Some(FilmRecord {
        rank: 0,
        title: title.to_string(),
        budget,
        revenue,
        ratio: budget as f64 / revenue as f64,
        rating: row.vote_average.trim().parse::<f64>().ok().filter(|r| r.is_finite()),
        year,
        production_company: first_company(&row.production_companies),
        wiki_url: None,
        abstract_text: None,
    })
}

/// Integer amounts, also accepting integral floats like `"373554033.0"`.
fn parse_amount(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_year(raw: &str) -> Option<i32> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}

fn first_company(raw: &str) -> String {
    COMPANY_NAME_RE
        .captures(raw)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().replace("\\'", "'").replace("\\\"", "\"").trim().to_string())
        .unwrap_or_default()
}
