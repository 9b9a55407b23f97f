//! Turning source files into page-level [`TextUnit`]s.
//!
//! Each format is a [`Loader`]; [`LoaderRegistry`] picks one by file extension.

mod ocr;
mod pdf;
mod text;

use std::path::{Path, PathBuf};

pub use ocr::{OcrEngine, TesseractOcr};
pub use pdf::{LopdfExtractor, PageExtractor, PageText, PdfLoader};
pub use text::TextFileLoader;

use crate::config::Config;
use crate::text_unit::TextUnit;

/// Extracts text units from one source file.
pub trait Loader: Send + Sync {
    /// Lowercase file extensions this loader handles, without the dot.
    fn extensions(&self) -> &[&'static str];

    fn load(&self, path: &Path) -> Result<Vec<TextUnit>, LoadError>;
}

/// The set of loaders available for ingestion.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn Loader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// PDF (with OCR fallback unless disabled) plus plain text and markdown.
    pub fn from_config(config: &Config) -> Self {
        let pdf = PdfLoader::new(
            LopdfExtractor,
            TesseractOcr::from_config(&config.ocr),
            config.ocr.threshold,
        )
        .with_ocr_enabled(config.ocr.enabled);
        Self::new().with(pdf).with(TextFileLoader)
    }

    pub fn with(mut self, loader: impl Loader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    pub fn loader_for(&self, path: &Path) -> Option<&dyn Loader> {
        let ext = extension_of(path)?;
        self.loaders
            .iter()
            .find(|l| l.extensions().contains(&ext.as_str()))
            .map(|l| l.as_ref())
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.loader_for(path).is_some()
    }

    /// All extensions any registered loader accepts.
    pub fn extensions(&self) -> Vec<&'static str> {
        self.loaders
            .iter()
            .flat_map(|l| l.extensions().iter().copied())
            .collect()
    }

    pub fn load(&self, path: &Path) -> Result<Vec<TextUnit>, LoadError> {
        self.loader_for(path)
            .ok_or_else(|| LoadError::Unsupported(path.to_path_buf()))?
            .load(path)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Text used as the `source` metadata for a path.
pub(crate) fn source_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {0}: {1}")]
    Open(PathBuf, String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("page {page}: {message}")]
    Page { page: usize, message: String },
    #[error("OCR failed for {0}: {1}")]
    Ocr(PathBuf, String),
    #[error("no loader for {0}")]
    Unsupported(PathBuf),
}
