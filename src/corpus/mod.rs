pub mod classify;
pub mod reader;
pub mod title;

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::CorpusError;

/// One `<doc>` of the abstract dump. Lives only while it is being correlated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WikiDocument {
    pub title: String,
    pub url: String,
    pub abstract_text: String,
    pub section_anchors: Vec<String>,
}

/// Open a corpus for streaming, decoding `.gz` dumps on the fly. `wrap` lets
/// the caller observe raw bytes read (progress) before decompression.
pub fn open<F>(path: &Path, wrap: F) -> Result<Box<dyn BufRead>, CorpusError>
where
    F: FnOnce(File) -> Box<dyn Read>,
{
    let file = File::open(path).map_err(|source| CorpusError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = wrap(file);
    let gzipped = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(raw))))
    } else {
        Ok(Box::new(BufReader::new(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const DUMP: &str = "<feed><doc><title>Wikipedia: A</title><url>u</url><abstract>a</abstract><links/></doc></feed>";

    fn plain(file: File) -> Box<dyn Read> {
        Box::new(file)
    }

    #[test]
    fn opens_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("abstract.xml");
        std::fs::write(&xml, DUMP).unwrap();

        let gz = dir.path().join("abstract.xml.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(DUMP.as_bytes()).unwrap();
        encoder.finish().unwrap();

        for path in [&xml, &gz] {
            let mut text = String::new();
            open(path, plain).unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, DUMP);
        }
    }

    #[test]
    fn missing_corpus_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = open(&dir.path().join("missing.xml"), plain).err().unwrap();
        assert!(!err.is_recoverable());
    }
}
