//! A pull-based reader yielding the XML elements of interest from a document.
use crate::error::{ProcessingError, ProcessingResult};
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A start (or empty) XML element together with its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// The element's local name (i.e. without any namespace prefix)
    pub name: String,
    /// Byte offset of the element in the (decompressed) document
    pub position: u64,
    attributes: Vec<(String, String)>,
}

impl Element {
    /// Create a new [`Element`] with no attributes
    pub fn new(name: &str, position: u64) -> Self {
        Self {
            name: name.to_string(),
            position,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute to the element
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    /// Get the (unescaped) value of an attribute, if present
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the value of an attribute, raising a [`ProcessingError::Data`] if it is absent
    pub fn required_attribute(&self, key: &str) -> ProcessingResult<&str> {
        self.attribute(key).ok_or_else(|| {
            ProcessingError::data(
                self.position,
                format!("<{}> element is missing attribute {key}", self.name),
            )
        })
    }

    /// Get the value of an attribute as an `f64`, raising a [`ProcessingError::Data`] if it is
    /// absent or not a number
    pub fn required_f64(&self, key: &str) -> ProcessingResult<f64> {
        let value = self.required_attribute(key)?;
        value.trim().parse().map_err(|_| {
            ProcessingError::data(
                self.position,
                format!("Attribute {key} of <{}> is not a number: {value:?}", self.name),
            )
        })
    }
}

/// Streams the elements with a given local name out of an XML document.
///
/// Only one element's worth of data is held in memory at a time. Iteration stops after the first
/// error. Reaching the end of the data is only accepted if the document had exactly one root
/// element and every element was closed.
pub struct ElementReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    element_name: String,
    source: PathBuf,
    depth: usize,
    seen_root: bool,
    finished: bool,
}

impl<R: BufRead> ElementReader<R> {
    /// Create a new [`ElementReader`]
    ///
    /// # Arguments
    ///
    /// * `input` - The XML data
    /// * `source` - Where the data came from (used in error messages)
    /// * `element_name` - The local name of the elements to yield
    pub fn new(input: R, source: &Path, element_name: &str) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            element_name: element_name.to_string(),
            source: source.to_path_buf(),
            depth: 0,
            seen_root: false,
            finished: false,
        }
    }

    /// Read up to the next matching element, or `None` at the end of a well-formed document
    fn read_next(&mut self) -> ProcessingResult<Option<Element>> {
        loop {
            self.buf.clear();
            let position = self.reader.buffer_position();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|err| convert_error(err, &self.source, position))?;

            let (start, is_empty) = match event {
                Event::Start(start) => (start, false),
                Event::Empty(start) => (start, true),
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    continue;
                }
                Event::Text(text) if self.depth == 0 => {
                    if text.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Err(malformed(position, "Text outside the root element"));
                }
                Event::CData(_) if self.depth == 0 => {
                    return Err(malformed(position, "CDATA outside the root element"));
                }
                Event::Eof if self.depth > 0 => {
                    return Err(malformed(
                        position,
                        &format!("Document ended with {} unclosed element(s)", self.depth),
                    ));
                }
                Event::Eof if !self.seen_root => {
                    return Err(malformed(position, "Document has no root element"));
                }
                Event::Eof => return Ok(None),
                _ => continue,
            };

            if self.depth == 0 {
                if self.seen_root {
                    return Err(malformed(position, "Document has more than one root element"));
                }
                self.seen_root = true;
            }
            if !is_empty {
                self.depth += 1;
            }

            if start.local_name().as_ref() == self.element_name.as_bytes() {
                return decode_element(&start, self.reader.decoder(), position).map(Some);
            }
        }
    }
}

impl<R: BufRead> Iterator for ElementReader<R> {
    type Item = ProcessingResult<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = self.read_next().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

/// A [`ProcessingError::Parse`] for a document which is not well formed
fn malformed(position: u64, message: &str) -> ProcessingError {
    ProcessingError::Parse {
        position,
        message: message.to_string(),
    }
}

/// Copy the name and attributes out of a start tag
fn decode_element(start: &BytesStart<'_>, decoder: Decoder, position: u64) -> ProcessingResult<Element> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut element = Element::new(&name, position);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| ProcessingError::Parse {
            position,
            message: err.to_string(),
        })?;
        let value = attr.decode_and_unescape_value(decoder).map_err(|err| ProcessingError::Parse {
            position,
            message: err.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        element.attributes.push((key, value.into_owned()));
    }

    Ok(element)
}

/// Sort quick-xml's errors into I/O failures (including decompression) and malformed XML
fn convert_error(err: quick_xml::Error, source: &Path, position: u64) -> ProcessingError {
    match err {
        quick_xml::Error::Io(err) => ProcessingError::Io {
            path: source.to_path_buf(),
            source: Arc::try_unwrap(err)
                .unwrap_or_else(|err| io::Error::new(err.kind(), err.to_string())),
        },
        err => ProcessingError::Parse {
            position,
            message: err.to_string(),
        },
    }
}
