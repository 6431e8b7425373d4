use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info};

use crate::corpus::classify::is_candidate;
use crate::corpus::title::{normalize, Normalized};
use crate::corpus::WikiDocument;
use crate::error::{CorpusError, CorrelateError};
use crate::ranking::RankedIndex;

const LOG_EVERY: u64 = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelateStats {
    pub documents_seen: u64,
    pub candidates: u64,
    pub unrepresentable: u64,
    pub malformed: u64,
    /// Lookup hits, including hits on records that were already enriched.
    pub matches: u64,
    /// Hits that actually wrote enrichment (first match per record).
    pub enriched: u64,
}

pub struct CorrelateOptions {
    /// Stop after this many documents; statistics so far are returned.
    pub limit: Option<u64>,
    pub progress_every: u64,
}

impl Default for CorrelateOptions {
    fn default() -> Self {
        CorrelateOptions {
            limit: None,
            progress_every: 10_000,
        }
    }
}

/// One forward pass over `documents`: classify, normalize, look up, enrich.
/// Each document is dropped before the next one is pulled.
pub fn correlate<I>(
    documents: I,
    index: &mut RankedIndex,
    opts: &CorrelateOptions,
    pb: &ProgressBar,
) -> Result<CorrelateStats, CorrelateError>
where
    I: IntoIterator<Item = Result<WikiDocument, CorpusError>>,
{
    let mut stats = CorrelateStats::default();
    let progress_every = opts.progress_every.max(1);

    let limit = opts
        .limit
        .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

    for item in documents.into_iter().take(limit) {
        let doc = match item {
            Ok(doc) => doc,
            Err(e) if e.is_recoverable() => {
                debug!("Skipping document: {}", e);
                stats.documents_seen += 1;
                stats.malformed += 1;
                continue;
            }
            Err(source) => return Err(CorrelateError { stats, source }),
        };
        stats.documents_seen += 1;

        correlate_one(&doc, index, &mut stats);

        if stats.documents_seen % progress_every == 0 {
            pb.set_message(progress_message(&stats));
        }
        if stats.documents_seen % LOG_EVERY == 0 {
            info!(
                "Scanned {} documents ({} matches)",
                stats.documents_seen, stats.matches
            );
        }
    }

    if opts.limit == Some(stats.documents_seen) {
        info!("Document limit reached, stopped scan early");
    }
    pb.set_message(progress_message(&stats));
    Ok(stats)
}

fn correlate_one(doc: &WikiDocument, index: &mut RankedIndex, stats: &mut CorrelateStats) {
    if !is_candidate(doc) {
        return;
    }
    stats.candidates += 1;

    let key = match normalize(&doc.title) {
        Normalized::Key(key) => key,
        Normalized::Unrepresentable => {
            stats.unrepresentable += 1;
            return;
        }
    };

    let Some(slot) = index.lookup(&key) else {
        return;
    };
    stats.matches += 1;
    if index.enrich(slot, &doc.url, &doc.abstract_text) {
        stats.enriched += 1;
        debug!("Enriched {:?} ({:?}) from {}", key.title, key.year, doc.url);
    }
}

fn progress_message(stats: &CorrelateStats) -> String {
    format!(
        "{} docs, {} candidates, {} matches",
        stats.documents_seen, stats.candidates, stats.matches
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::reader::DocumentReader;
    use crate::dataset::RawFilmRow;

    fn film(title: &str, budget: &str, revenue: &str, date: &str) -> RawFilmRow {
        RawFilmRow {
            title: title.to_string(),
            budget: budget.to_string(),
            revenue: revenue.to_string(),
            vote_average: "7.0".to_string(),
            release_date: date.to_string(),
            production_companies: "[{'name': 'Studio', 'id': 1}]".to_string(),
        }
    }

    fn doc(title: &str, anchors: &[&str], url: &str, abstract_text: &str) -> WikiDocument {
        WikiDocument {
            title: title.to_string(),
            url: url.to_string(),
            abstract_text: abstract_text.to_string(),
            section_anchors: anchors.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn run(
        docs: Vec<Result<WikiDocument, CorpusError>>,
        index: &mut RankedIndex,
    ) -> Result<CorrelateStats, CorrelateError> {
        correlate(docs, index, &CorrelateOptions::default(), &ProgressBar::hidden())
    }

    fn index_with_a_1999() -> RankedIndex {
        RankedIndex::build(vec![film("A", "100", "50", "1999-06-01")], 10)
    }

    #[test]
    fn dated_title_enriches_matching_record() {
        let mut index = index_with_a_1999();
        let stats = run(vec![Ok(doc("A (1999 film)", &[], "u", "abs"))], &mut index).unwrap();
        assert_eq!(stats.matches, 1);
        let a = index.get(0).unwrap();
        assert_eq!(a.wiki_url.as_deref(), Some("u"));
        assert_eq!(a.abstract_text.as_deref(), Some("abs"));
    }

    #[test]
    fn qualified_title_never_matches() {
        let mut index = index_with_a_1999();
        let stats = run(vec![Ok(doc("A (1999 French film)", &[], "u", "abs"))], &mut index).unwrap();
        assert_eq!(stats.matches, 0);
        assert_eq!(stats.unrepresentable, 1);
        assert!(!index.get(0).unwrap().is_enriched());
    }

    #[test]
    fn anchor_overlap_makes_candidate_and_reaches_lookup() {
        let mut index = RankedIndex::build(vec![film("A", "1", "2", "")], 10);
        let stats = run(
            vec![Ok(doc("Wikipedia: A", &["Cast", "History"], "u", "abs"))],
            &mut index,
        )
        .unwrap();
        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.matches, 1);
        assert!(index.get(0).unwrap().is_enriched());
    }

    #[test]
    fn non_candidates_are_never_looked_up() {
        let mut index = RankedIndex::build(vec![film("A", "1", "2", "")], 10);
        let stats = run(vec![Ok(doc("Wikipedia: A", &["History"], "u", "abs"))], &mut index).unwrap();
        assert_eq!(stats.documents_seen, 1);
        assert_eq!(stats.candidates, 0);
        assert!(!index.get(0).unwrap().is_enriched());
    }

    #[test]
    fn dated_title_does_not_fall_back_to_yearless_record() {
        let mut index = RankedIndex::build(vec![film("A", "1", "2", "")], 10);
        let stats = run(vec![Ok(doc("A (1999 film)", &[], "u", "abs"))], &mut index).unwrap();
        assert_eq!(stats.matches, 0);
        assert!(!index.get(0).unwrap().is_enriched());
    }

    #[test]
    fn year_disambiguates_same_title() {
        let mut index = RankedIndex::build(
            vec![film("Heat", "1", "10", "1995-12-15"), film("Heat", "1", "5", "1986-01-01")],
            10,
        );
        run(
            vec![Ok(doc("Wikipedia: Heat (1986 film)", &[], "u1986", "old"))],
            &mut index,
        )
        .unwrap();
        for f in index.films() {
            match f.year {
                Some(1986) => assert_eq!(f.wiki_url.as_deref(), Some("u1986")),
                _ => assert!(!f.is_enriched()),
            }
        }
    }

    #[test]
    fn first_match_wins() {
        let mut index = index_with_a_1999();
        let stats = run(
            vec![
                Ok(doc("A (1999 film)", &[], "first", "one")),
                Ok(doc("A (1999 film)", &["Plot"], "second", "two")),
            ],
            &mut index,
        )
        .unwrap();
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.enriched, 1);
        let a = index.get(0).unwrap();
        assert_eq!(a.wiki_url.as_deref(), Some("first"));
        assert_eq!(a.abstract_text.as_deref(), Some("one"));
    }

    #[test]
    fn malformed_document_is_skipped() {
        let mut index = index_with_a_1999();
        let stats = run(
            vec![
                Err(CorpusError::MalformedDocument {
                    ordinal: 1,
                    missing: "url",
                }),
                Ok(doc("A (1999 film)", &[], "u", "abs")),
            ],
            &mut index,
        )
        .unwrap();
        assert_eq!(stats.documents_seen, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.matches, 1);
    }

    #[test]
    fn fatal_error_keeps_partial_matches_and_reports_stats() {
        let mut index = index_with_a_1999();
        let broken = "<feed><doc><title>A (1999 film)</title><url>u</url><abstract>abs</abstract></doc>\
                      <doc><title>B</url></doc></feed>";
        let err = run(DocumentReader::new(broken.as_bytes()).collect(), &mut index)
            .err()
            .unwrap();
        assert_eq!(err.stats.documents_seen, 1);
        assert_eq!(err.stats.matches, 1);
        assert!(index.get(0).unwrap().is_enriched());
    }

    #[test]
    fn limit_stops_at_document_boundary() {
        let mut index = index_with_a_1999();
        let docs = vec![
            Ok(doc("Wikipedia: X", &[], "x", "")),
            Ok(doc("Wikipedia: Y", &[], "y", "")),
            Ok(doc("A (1999 film)", &[], "u", "abs")),
        ];
        let opts = CorrelateOptions {
            limit: Some(2),
            ..CorrelateOptions::default()
        };
        let stats = correlate(docs, &mut index, &opts, &ProgressBar::hidden()).unwrap();
        assert_eq!(stats.documents_seen, 2);
        assert_eq!(stats.matches, 0);
        assert!(!index.get(0).unwrap().is_enriched());
    }

    #[test]
    fn streams_from_xml_reader() {
        let mut index = RankedIndex::build(
            vec![film("Heat", "60000000", "187436818", "1995-12-15"), film("Alien", "11000000", "104931801", "1979-05-25")],
            10,
        );
        let xml = "<feed>\
            <doc><title>Wikipedia: Heat (1995 film)</title><url>https://en.wikipedia.org/wiki/Heat_(1995_film)</url><abstract>Heat is a crime film.</abstract><links/></doc>\
            <doc><title>Wikipedia: Alien (franchise)</title><url>f</url><abstract>franchise</abstract><links><sublink><anchor>Release</anchor></sublink></links></doc>\
            <doc><title>Wikipedia: Alien (film)</title><url>https://en.wikipedia.org/wiki/Alien_(film)</url><abstract>Alien is a 1979 film.</abstract><links/></doc>\
            </feed>";
        let stats = run(DocumentReader::new(xml.as_bytes()).collect(), &mut index).unwrap();
        assert_eq!(stats.documents_seen, 3);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.matches, 2);
        assert_eq!(index.enriched_count(), 2);
    }
}
