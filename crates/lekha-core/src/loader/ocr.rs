//! Image-based text recognition for PDFs without a usable text layer.
//!
//! Pages are rasterized with pdfium and fed to the `tesseract` executable.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::{ImageBuffer, RgbImage};
use pdfium_render::prelude::*;
use tracing::debug;

use super::pdf::PageText;
use super::LoadError;
use crate::config::OcrConfig;

/// PDF user space is 72 units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Recognizes text from every page of a document, in page order.
pub trait OcrEngine: Send + Sync {
    /// The outer error means OCR could not run at all (engine missing,
    /// document unrenderable); per-page failures are inner errors.
    fn recognize_pages(&self, path: &Path) -> Result<Vec<PageText>, LoadError>;
}

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    languages: Vec<String>,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<PathBuf>, languages: Vec<String>, dpi: u32) -> Self {
        Self {
            binary: binary.into(),
            languages,
            dpi,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.tesseract, config.languages.clone(), config.dpi)
    }

    /// Tesseract's `-l` argument, e.g. `eng+tel+hin`.
    fn language_arg(&self) -> String {
        if self.languages.is_empty() {
            "eng".to_string()
        } else {
            self.languages.join("+")
        }
    }

    /// Fails fast when the executable can't be started.
    fn probe(&self, path: &Path) -> Result<(), LoadError> {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|_| ())
            .map_err(|e| {
                LoadError::Ocr(
                    path.to_path_buf(),
                    format!("cannot run {}: {e}", self.binary.display()),
                )
            })
    }

    fn render_page(
        &self,
        page: &PdfPage,
        config: &PdfRenderConfig,
        out: &Path,
        number: usize,
    ) -> Result<PathBuf, LoadError> {
        let page_err = |message: String| LoadError::Page {
            page: number,
            message,
        };
        let bitmap = page
            .render_with_config(config)
            .map_err(|e| page_err(format!("render failed: {e}")))?;
        let width = bitmap.width() as u32;
        let height = bitmap.height() as u32;

        // pdfium hands back BGRA.
        let pixels = bitmap.as_raw_bytes();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for px in pixels.chunks_exact(4) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        let image: RgbImage = ImageBuffer::from_raw(width, height, rgb)
            .ok_or_else(|| page_err("bitmap size does not match its pixels".into()))?;

        let image_path = out.join(format!("page_{number}.png"));
        image
            .save(&image_path)
            .map_err(|e| page_err(format!("failed to write page image: {e}")))?;
        Ok(image_path)
    }

    fn recognize_image(&self, image: &Path, number: usize) -> PageText {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(self.language_arg())
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .output()
            .map_err(|e| LoadError::Page {
                page: number,
                message: format!("tesseract failed to start: {e}"),
            })?;
        if !output.status.success() {
            return Err(LoadError::Page {
                page: number,
                message: format!("tesseract: {}", String::from_utf8_lossy(&output.stderr).trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize_pages(&self, path: &Path) -> Result<Vec<PageText>, LoadError> {
        let fatal = |message: String| LoadError::Ocr(path.to_path_buf(), message);
        self.probe(path)?;

        let bindings = Pdfium::bind_to_system_library()
            .map_err(|e| fatal(format!("pdfium library unavailable: {e}")))?;
        let pdfium = Pdfium::new(bindings);
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| fatal(format!("pdfium could not open document: {e}")))?;
        let workdir = tempfile::tempdir().map_err(|e| fatal(format!("temp dir: {e}")))?;

        let render = PdfRenderConfig::new().scale_page_by_factor(self.dpi as f32 / POINTS_PER_INCH);
        let mut pages = Vec::new();
        for (i, page) in document.pages().iter().enumerate() {
            let number = i + 1;
            let text = self
                .render_page(&page, &render, workdir.path(), number)
                .and_then(|image| self.recognize_image(&image, number));
            debug!(source = %path.display(), page = number, ok = text.is_ok(), "page recognized");
            pages.push(text);
        }
        Ok(pages)
    }
}
