use super::WikiDocument;

/// Section names that mostly appear on film pages. Over-inclusive on purpose:
/// the index lookup is what rejects non-film pages.
pub const FILM_SECTIONS: &[&str] = &[
    "Plot",
    "Cast",
    "Production",
    "Soundtrack",
    "Marketing",
    "Release",
    "Reception",
    "Merchandising",
    "Awards",
    "Sequel",
    "Synopsis",
];

pub fn is_candidate(doc: &WikiDocument) -> bool {
    doc.title.trim_end().ends_with("film)")
        || doc
            .section_anchors
            .iter()
            .any(|anchor| FILM_SECTIONS.contains(&anchor.as_str()))
}
