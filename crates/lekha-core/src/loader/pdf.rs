//! PDF loading: text layer per page, with OCR over the whole document when
//! too many pages come back empty (scanned documents).

use std::path::Path;

use tracing::{debug, info, warn};

use super::ocr::{OcrEngine, TesseractOcr};
use super::{source_id, LoadError, Loader};
use crate::text_unit::TextUnit;

/// Outcome of extracting one page. `Err` is a page-level failure.
pub type PageText = Result<String, LoadError>;

/// Reads the text layer of a PDF, page by page.
pub trait PageExtractor: Send + Sync {
    /// One entry per page, in page order. The outer error means the document
    /// could not be opened at all.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, LoadError>;
}

/// Text-layer extraction with `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

impl PageExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, LoadError> {
        let doc = lopdf::Document::load(path)
            .map_err(|e| LoadError::Open(path.to_path_buf(), e.to_string()))?;
        Ok(doc
            .get_pages()
            .keys()
            .map(|&number| {
                doc.extract_text(&[number]).map_err(|e| LoadError::Page {
                    page: number as usize,
                    message: e.to_string(),
                })
            })
            .collect())
    }
}

/// Loads PDFs one text unit per page and falls back to OCR for scanned documents.
pub struct PdfLoader<X = LopdfExtractor, O = TesseractOcr> {
    extractor: X,
    ocr: O,
    threshold: f64,
    ocr_enabled: bool,
}

impl<X: PageExtractor, O: OcrEngine> PdfLoader<X, O> {
    /// `threshold` is the fraction of empty pages that triggers OCR.
    pub fn new(extractor: X, ocr: O, threshold: f64) -> Self {
        Self {
            extractor,
            ocr,
            threshold,
            ocr_enabled: true,
        }
    }

    pub fn with_ocr_enabled(mut self, enabled: bool) -> Self {
        self.ocr_enabled = enabled;
        self
    }
}

/// Number of empty pages at which OCR kicks in: `max(1, ceil(threshold * pages))`.
pub(crate) fn ocr_trigger(threshold: f64, page_count: usize) -> usize {
    // The epsilon keeps 0.3 * 10 at 3 rather than rounding up to 4.
    let raw = (threshold * page_count as f64 - 1e-9).ceil();
    (raw.max(1.0)) as usize
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

impl<X: PageExtractor, O: OcrEngine> Loader for PdfLoader<X, O> {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn load(&self, path: &Path) -> Result<Vec<TextUnit>, LoadError> {
        let source = source_id(path);
        let pages = self.extractor.extract_pages(path)?;
        let page_count = pages.len();

        let mut units = Vec::new();
        let mut empty = 0;
        for (i, page) in pages.into_iter().enumerate() {
            match page {
                Ok(text) if !is_blank(&text) => units.push(TextUnit::page(&source, i + 1, text)),
                Ok(_) => empty += 1,
                Err(e) => {
                    debug!(source = %source, page = i + 1, error = %e, "text extraction failed");
                    empty += 1;
                }
            }
        }

        if page_count == 0 || empty < ocr_trigger(self.threshold, page_count) {
            return Ok(units);
        }
        if !self.ocr_enabled {
            warn!(source = %source, empty, page_count, "document looks scanned but OCR is disabled");
            return Ok(units);
        }

        info!(source = %source, empty, page_count, "running OCR fallback");
        let recognized = self.ocr.recognize_pages(path)?;
        for (i, page) in recognized.into_iter().enumerate() {
            match page {
                Ok(text) if !is_blank(&text) => {
                    units.push(TextUnit::ocr_page(&source, i + 1, text))
                }
                Ok(_) => {}
                Err(e) => warn!(source = %source, page = i + 1, error = %e, "OCR failed for page"),
            }
        }
        Ok(units)
    }
}
