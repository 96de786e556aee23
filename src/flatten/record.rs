//! Per-document flattening into a path-keyed record

use crate::error::{Error, FlattenError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Separator between element names in a record path
pub const PATH_SEPARATOR: char = '.';

/// Leaf values of one document keyed by dot-joined element path
///
/// Paths keep first-seen order; a path that recurs under repeated sibling
/// elements accumulates its values in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlatRecord {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl FlatRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `path`
    pub fn push(&mut self, path: &str, value: impl Into<String>) {
        match self.index.get(path) {
            Some(&i) => self.entries[i].1.push(value.into()),
            None => {
                self.index.insert(path.to_string(), self.entries.len());
                self.entries.push((path.to_string(), vec![value.into()]));
            }
        }
    }

    /// All values recorded at `path`
    pub fn get(&self, path: &str) -> Option<&[String]> {
        self.index.get(path).map(|&i| self.entries[i].1.as_slice())
    }

    /// First value recorded at `path`
    pub fn first(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.first()).map(String::as_str)
    }

    /// Paths and their values in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v.as_slice()))
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no leaf value was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flatten the document at `path`
pub fn flatten_document(path: &Path) -> Result<FlatRecord> {
    let file = std::fs::File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open document '{}': {}", path.display(), e),
        ))
    })?;
    flatten_reader(std::io::BufReader::new(file), path)
}

/// Flatten a document from any buffered reader; `source` is only used in errors
///
/// Traversal is depth-first pre-order. Opening an element pushes its local
/// name and starts a fresh text buffer; closing it records the trimmed
/// buffer (when non-empty and not interrupted by a child) at the full path.
pub fn flatten_reader<R: BufRead>(input: R, source: &Path) -> Result<FlatRecord> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text: Option<String> = None;
    let mut record = FlatRecord::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(source, reader.buffer_position() as u64, e))?;

        match event {
            Event::Start(e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text = Some(String::new());
            }
            Event::Empty(_) => {
                text = None;
            }
            Event::Text(e) => {
                if let Some(text) = text.as_mut() {
                    let chunk = e
                        .unescape()
                        .map_err(|err| malformed(source, reader.buffer_position() as u64, err))?;
                    text.push_str(&chunk);
                }
            }
            Event::CData(e) => {
                if let Some(text) = text.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => {
                if let Some(value) = text.take() {
                    let value = value.trim();
                    if !value.is_empty() {
                        let path = stack.join(&PATH_SEPARATOR.to_string());
                        record.push(&path, value);
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(FlattenError::Truncated {
            path: source.to_path_buf(),
            open: stack.len(),
        }
        .into());
    }

    Ok(record)
}

fn malformed(source: &Path, position: u64, reason: impl std::fmt::Display) -> Error {
    FlattenError::Malformed {
        path: source.to_path_buf(),
        position,
        reason: reason.to_string(),
    }
    .into()
}
