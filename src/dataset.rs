use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::DatasetError;

const REQUIRED_COLUMNS: &[&str] = &[
    "title",
    "budget",
    "revenue",
    "vote_average",
    "release_date",
    "production_companies",
];

/// One undecoded row of the financial dataset. Cells stay as text; the
/// ranking stage decides what a usable budget or date looks like.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFilmRow {
    pub title: String,
    pub budget: String,
    pub revenue: String,
    pub vote_average: String,
    pub release_date: String,
    pub production_companies: String,
}

pub struct DatasetLoad {
    pub rows: Vec<RawFilmRow>,
    pub skipped: usize,
}

pub fn read_rows(path: &Path) -> Result<DatasetLoad, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let load = read_rows_from(path, file)?;
    info!(
        "Loaded {} film rows from {} ({} skipped)",
        load.rows.len(),
        path.display(),
        load.skipped
    );
    Ok(load)
}

fn read_rows_from<R: Read>(path: &Path, reader: R) -> Result<DatasetLoad, DatasetError> {
    let mut reader = ReaderBuilder::new()
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader.headers().map_err(|source| DatasetError::Headers {
        path: path.to_path_buf(),
        source,
    })?;
    for &column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h.trim() == column) {
            return Err(DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in reader.deserialize::<RawFilmRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => {
                return Err(DatasetError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                // +2: header row, 1-based lines
                debug!("Skipping film row {}: {}", line + 2, e);
                skipped += 1;
            }
        }
    }

    Ok(DatasetLoad { rows, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(csv: &str) -> Result<DatasetLoad, DatasetError> {
        read_rows_from(Path::new("inline.csv"), csv.as_bytes())
    }

    #[test]
    fn reads_required_columns_and_ignores_extras() {
        let csv = "adult,budget,id,production_companies,release_date,revenue,title,vote_average\n\
                   False,30000000,862,\"[{'name': 'Pixar Animation Studios', 'id': 3}]\",1995-10-30,373554033,Toy Story,7.7\n";
        let load = load(csv).unwrap();
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.skipped, 0);
        let row = &load.rows[0];
        assert_eq!(row.title, "Toy Story");
        assert_eq!(row.budget, "30000000");
        assert_eq!(row.revenue, "373554033");
        assert_eq!(row.release_date, "1995-10-30");
        assert!(row.production_companies.contains("Pixar"));
    }

    #[test]
    fn missing_column_is_fatal() {
        let csv = "title,budget,revenue\nA,1,2\n";
        match load(csv) {
            Err(DatasetError::MissingColumn { column, .. }) => assert_eq!(column, "vote_average"),
            other => panic!("expected MissingColumn, got {:?}", other.map(|l| l.rows.len())),
        }
    }

    #[test]
    fn ragged_row_is_skipped_not_fatal() {
        let csv = "title,budget,revenue,vote_average,release_date,production_companies\n\
                   A,100,50,6.0,1999-01-01,[]\n\
                   broken,row\n\
                   B,10,20,5.0,2001-05-05,[]\n";
        let load = load(csv).unwrap();
        assert_eq!(load.rows.len(), 2);
        assert_eq!(load.skipped, 1);
        assert_eq!(load.rows[1].title, "B");
    }

    #[test]
    fn unreadable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_rows(&dir.path().join("nope.csv")).err().unwrap();
        assert!(matches!(err, DatasetError::Open { .. }));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "title,budget,revenue,vote_average,release_date,production_companies"
        )
        .unwrap();
        writeln!(file, "Heat,60000000,187436818,7.7,1995-12-15,[]").unwrap();
        let load = read_rows(file.path()).unwrap();
        assert_eq!(load.rows.len(), 1);
        assert_eq!(load.rows[0].title, "Heat");
    }
}
