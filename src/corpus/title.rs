use std::sync::LazyLock;

use regex::Regex;

const DUMP_PREFIX: &str = "Wikipedia: ";

static DATED_FILM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\((\d{4}) film\)$").unwrap());
// Any other parenthetical ending in "film)": "(1999 American film)", "(American film)".
static QUALIFIED_FILM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?:[^()]*\s)?[^()\s]+ film\)$").unwrap());

/// Join key shared by the ranked index and corpus titles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TitleKey {
    pub title: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Key(TitleKey),
    /// The title carries disambiguation the key cannot express; never matched.
    Unrepresentable,
}

pub fn normalize(raw_title: &str) -> Normalized {
    let title = raw_title.strip_prefix(DUMP_PREFIX).unwrap_or(raw_title).trim();

    if let Some(caps) = DATED_FILM_RE.captures(title) {
        if let Ok(year) = caps[2].parse::<i32>() {
            return key(&caps[1], Some(year));
        }
    }
    if let Some(stripped) = title.strip_suffix(" (film)") {
        return key(stripped, None);
    }
    if QUALIFIED_FILM_RE.is_match(title) {
        return Normalized::Unrepresentable;
    }
    key(title, None)
}

fn key(title: &str, year: Option<i32>) -> Normalized {
    Normalized::Key(TitleKey {
        title: title.trim().to_string(),
        year,
    })
}
