//! The record that flows through the whole pipeline: a piece of document text
//! plus where it came from.
//!
//! Units are built once (by a loader or the chunker) and never mutated.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key: path of the source document.
pub const SOURCE: &str = "source";
/// Metadata key: 1-based page number.
pub const PAGE: &str = "page";
/// Metadata key: `true` when the text came from OCR.
pub const OCR: &str = "ocr";
/// Metadata key: 0-based position of a chunk within its parent unit.
pub const CHUNK_INDEX: &str = "chunk_index";

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Int(i) => write!(f, "{i}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

pub type Metadata = BTreeMap<String, MetaValue>;

/// Extracted or chunked text with provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    content: String,
    metadata: Metadata,
}

impl TextUnit {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// A unit for one page of text extracted directly from a document.
    pub fn page(source: impl Into<String>, page: usize, content: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE.to_string(), MetaValue::Text(source.into()));
        metadata.insert(PAGE.to_string(), page.into());
        Self::new(content, metadata)
    }

    /// Like [`TextUnit::page`], but marked as recognized from a page image.
    pub fn ocr_page(source: impl Into<String>, page: usize, content: impl Into<String>) -> Self {
        let mut unit = Self::page(source, page, content);
        unit.metadata.insert(OCR.to_string(), MetaValue::Bool(true));
        unit
    }

    /// Derive a chunk: same metadata plus `chunk_index`.
    pub fn chunk(&self, content: impl Into<String>, index: usize) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert(CHUNK_INDEX.to_string(), index.into());
        Self::new(content, metadata)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key)
    }

    pub fn source(&self) -> Option<&str> {
        match self.metadata.get(SOURCE) {
            Some(MetaValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn page_number(&self) -> Option<i64> {
        match self.metadata.get(PAGE) {
            Some(MetaValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_ocr(&self) -> bool {
        matches!(self.metadata.get(OCR), Some(MetaValue::Bool(true)))
    }

    pub fn chunk_index(&self) -> Option<i64> {
        match self.metadata.get(CHUNK_INDEX) {
            Some(MetaValue::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_unit_has_source_and_page() {
        let u = TextUnit::page("a.pdf", 3, "text");
        assert_eq!(u.source(), Some("a.pdf"));
        assert_eq!(u.page_number(), Some(3));
        assert!(!u.is_ocr());
        assert_eq!(u.chunk_index(), None);
    }

    #[test]
    fn chunk_keeps_parent_metadata() {
        let parent = TextUnit::ocr_page("b.pdf", 2, "one two three");
        let c = parent.chunk("two three", 1);
        assert_eq!(c.content(), "two three");
        assert_eq!(c.source(), Some("b.pdf"));
        assert!(c.is_ocr());
        assert_eq!(c.chunk_index(), Some(1));
        assert_eq!(parent.chunk_index(), None);
    }

    #[test]
    fn metadata_serializes_as_plain_scalars() {
        let u = TextUnit::ocr_page("c.pdf", 1, "x").chunk("x", 0);
        let json = serde_json::to_value(&u).unwrap();
        assert_eq!(json["metadata"]["page"], 1);
        assert_eq!(json["metadata"]["ocr"], true);
        assert_eq!(json["metadata"]["source"], "c.pdf");
        let back: TextUnit = serde_json::from_value(json).unwrap();
        assert_eq!(back, u);
    }
}
