use std::path::PathBuf;

use thiserror::Error;

use crate::correlate::CorrelateStats;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot open film dataset {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("film dataset {path} has no readable header row: {source}")]
    Headers {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("film dataset {path} is missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("read failed in film dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("cannot open corpus {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus is not well-formed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("document #{ordinal} has no <{missing}> element")]
    MalformedDocument { ordinal: u64, missing: &'static str },
}

impl CorpusError {
    /// A malformed single document is skipped; everything else ends the pass.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CorpusError::MalformedDocument { .. })
    }
}

#[derive(Debug, Error)]
#[error("corpus scan aborted after {} documents ({} matches)", .stats.documents_seen, .stats.matches)]
pub struct CorrelateError {
    pub stats: CorrelateStats,
    #[source]
    pub source: CorpusError,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table `films` already holds {rows} rows and if_exists=fail")]
    TableExists { rows: i64 },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
