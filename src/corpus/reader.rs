use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use super::WikiDocument;
use crate::error::CorpusError;

#[derive(Clone, Copy)]
enum Field {
    Title,
    Url,
    Abstract,
    Anchor,
}

#[derive(Default)]
struct PendingDoc {
    title: Option<String>,
    url: Option<String>,
    abstract_text: Option<String>,
    anchors: Vec<String>,
    in_sublink: bool,
}

impl PendingDoc {
    fn open(&mut self, tag: &[u8]) -> Option<Field> {
        let field = match tag {
            b"title" => {
                self.title = Some(String::new());
                Field::Title
            }
            b"url" => {
                self.url = Some(String::new());
                Field::Url
            }
            b"abstract" => {
                self.abstract_text = Some(String::new());
                Field::Abstract
            }
            b"anchor" if self.in_sublink => {
                self.anchors.push(String::new());
                Field::Anchor
            }
            _ => return None,
        };
        Some(field)
    }

    fn push_text(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => self.title.as_mut(),
            Field::Url => self.url.as_mut(),
            Field::Abstract => self.abstract_text.as_mut(),
            Field::Anchor => self.anchors.last_mut(),
        };
        if let Some(value) = target {
            value.push_str(text);
        }
    }

    fn finish(self, ordinal: u64) -> Result<WikiDocument, CorpusError> {
        let missing = |missing| CorpusError::MalformedDocument { ordinal, missing };
        Ok(WikiDocument {
            title: self.title.ok_or_else(|| missing("title"))?.trim().to_string(),
            url: self.url.ok_or_else(|| missing("url"))?.trim().to_string(),
            abstract_text: self
                .abstract_text
                .ok_or_else(|| missing("abstract"))?
                .trim()
                .to_string(),
            section_anchors: self
                .anchors
                .into_iter()
                .map(|a| a.trim().to_string())
                .collect(),
        })
    }
}

/// Pull parser over an abstract dump. Yields one `<doc>` at a time and keeps
/// nothing from earlier documents; the event buffer is reused between reads.
///
/// After a fatal error the iterator is exhausted.
pub struct DocumentReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    ordinal: u64,
    done: bool,
}

impl<R: BufRead> DocumentReader<R> {
    pub fn new(input: R) -> Self {
        DocumentReader {
            reader: Reader::from_reader(input),
            buf: Vec::with_capacity(8 * 1024),
            ordinal: 0,
            done: false,
        }
    }

    #[cfg(test)]
    fn buffer_capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl<R: BufRead> Iterator for DocumentReader<R> {
    type Item = Result<WikiDocument, CorpusError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut pending: Option<PendingDoc> = None;
        let mut field: Option<Field> = None;

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(source) => {
                    self.done = true;
                    return Some(Err(CorpusError::Xml {
                        position: self.reader.buffer_position() as u64,
                        source,
                    }));
                }
            };

            match event {
                Event::Start(e) => match e.name().as_ref() {
                    b"doc" => {
                        pending = Some(PendingDoc::default());
                        field = None;
                    }
                    b"sublink" => {
                        if let Some(doc) = pending.as_mut() {
                            doc.in_sublink = true;
                        }
                    }
                    tag => {
                        if let Some(doc) = pending.as_mut() {
                            field = doc.open(tag);
                        }
                    }
                },
                Event::Empty(e) => {
                    if let Some(doc) = pending.as_mut() {
                        doc.open(e.name().as_ref());
                    }
                }
                Event::Text(e) => {
                    if let (Some(doc), Some(f)) = (pending.as_mut(), field) {
                        let text = e
                            .unescape()
                            .map(|t| t.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                        doc.push_text(f, &text);
                    }
                }
                Event::CData(e) => {
                    if let (Some(doc), Some(f)) = (pending.as_mut(), field) {
                        doc.push_text(f, &String::from_utf8_lossy(&e));
                    }
                }
                Event::End(e) => {
                    field = None;
                    match e.name().as_ref() {
                        b"doc" => {
                            if let Some(doc) = pending.take() {
                                self.ordinal += 1;
                                return Some(doc.finish(self.ordinal));
                            }
                        }
                        b"sublink" => {
                            if let Some(doc) = pending.as_mut() {
                                doc.in_sublink = false;
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => {
                    self.done = true;
                    if pending.is_some() {
                        warn!(
                            "Corpus ended inside document #{}; dropping it",
                            self.ordinal + 1
                        );
                    }
                    return None;
                }
                _ => {}
            }
        }
    }
}
