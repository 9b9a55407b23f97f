//! Persisted config in the app data directory.
//!
//! Every tunable the pipeline uses lives here and is passed to components at
//! construction; nothing reads process-wide state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;

const CONFIG_FILENAME: &str = "config.toml";

/// Returned by the model when the retrieved context cannot answer a question.
pub const DEFAULT_REFUSAL: &str =
    "I cannot answer this question as the information is not available in the provided documents.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the source documents (PDFs).
    pub documents_root: Option<String>,
    /// Directory for the index artifacts. Defaults to `<app data>/index`.
    pub index_dir: Option<String>,
    /// Expected embedding dimension. Measured from the model when unset.
    pub embedding_dimension: Option<usize>,
    pub chunking: ChunkingConfig,
    pub ocr: OcrConfig,
    pub ollama: OllamaConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words repeated from the end of the previous chunk.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            overlap: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Fraction of empty pages at which the whole document is OCR'd.
    pub threshold: f64,
    /// Tesseract language codes.
    pub languages: Vec<String>,
    pub dpi: u32,
    /// Path or name of the `tesseract` executable.
    pub tesseract: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.3,
            languages: ["eng", "tel", "hin", "fra"].map(String::from).to_vec(),
            dpi: 300,
            tesseract: "tesseract".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub generate_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: crate::ollama::DEFAULT_BASE_URL.to_string(),
            embed_model: crate::ollama::DEFAULT_EMBED_MODEL.to_string(),
            generate_model: crate::ollama::DEFAULT_GENERATE_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_tokens: u32,
    /// Exact reply expected when the context is insufficient.
    pub refusal: String,
    pub embed_batch_size: usize,
    /// Embedding batches in flight at once.
    pub embed_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_tokens: 500,
            refusal: DEFAULT_REFUSAL.to_string(),
            embed_batch_size: 32,
            embed_concurrency: 4,
        }
    }
}

impl Config {
    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ChunkingConfig {
            chunk_size,
            overlap,
        } = self.chunking;
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size,
                overlap,
            });
        }
        let t = self.ocr.threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(ConfigError::InvalidThreshold(t));
        }
        if self.ocr.dpi == 0 {
            return Err(ConfigError::InvalidDpi);
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidRetrieval("top_k must be at least 1".into()));
        }
        if self.retrieval.embed_batch_size == 0 || self.retrieval.embed_concurrency == 0 {
            return Err(ConfigError::InvalidRetrieval(
                "embed_batch_size and embed_concurrency must be at least 1".into(),
            ));
        }
        if self.embedding_dimension == Some(0) {
            return Err(ConfigError::InvalidRetrieval(
                "embedding_dimension must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Directory of the persisted index, falling back to the app data dir.
    pub fn index_dir(&self) -> Option<PathBuf> {
        self.index_dir
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(app_data::default_index_dir)
    }

    pub fn documents_root(&self) -> Option<PathBuf> {
        self.documents_root
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    if !path.exists() {
        return Config::default();
    }
    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            Config::default()
        }
    }
}

/// Load and validate config from an explicit file.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
    let config: Config = toml::from_str(&s).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)
}

/// Set and persist the documents root.
pub fn set_documents_root(path: &Path) -> Result<(), ConfigError> {
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.documents_root = Some(path.to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("invalid chunking: overlap {overlap} must be smaller than chunk_size {chunk_size} (and chunk_size > 0)")]
    InvalidChunking { chunk_size: usize, overlap: usize },
    #[error("invalid OCR threshold {0}: must be in (0, 1]")]
    InvalidThreshold(f64),
    #[error("invalid OCR dpi: must be at least 1")]
    InvalidDpi,
    #[error("invalid retrieval settings: {0}")]
    InvalidRetrieval(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = Config::default();
        c.validate().unwrap();
        assert_eq!(c.chunking.chunk_size, 200);
        assert_eq!(c.chunking.overlap, 20);
        assert_eq!(c.ocr.dpi, 300);
        assert!(c.ocr.languages.iter().any(|l| l == "eng"));
        assert_eq!(c.retrieval.refusal, DEFAULT_REFUSAL);
    }

    #[test]
    fn overlap_not_below_chunk_size_is_rejected() {
        let mut c = Config::default();
        c.chunking.chunk_size = 10;
        c.chunking.overlap = 10;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidChunking { chunk_size: 10, overlap: 10 })
        ));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut c = Config::default();
        c.ocr.threshold = 0.0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidThreshold(_))));
        c.ocr.threshold = 1.5;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidThreshold(_))));
    }

    #[test]
    fn zero_dpi_is_rejected() {
        let mut c = Config::default();
        c.ocr.dpi = 0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidDpi)));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "documents_root = \"/data/raw\"\n[chunking]\nchunk_size = 50\n[ocr]\nlanguages = [\"eng\"]\n",
        )
        .unwrap();
        let c = load_config_from(&path).unwrap();
        assert_eq!(c.documents_root(), Some(PathBuf::from("/data/raw")));
        assert_eq!(c.chunking.chunk_size, 50);
        assert_eq!(c.chunking.overlap, 20);
        assert_eq!(c.ocr.languages, vec!["eng".to_string()]);
        assert_eq!(c.retrieval.top_k, 10);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chunking]\nchunk_size = 5\noverlap = 9\n").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::InvalidChunking { .. })
        ));
    }
}
