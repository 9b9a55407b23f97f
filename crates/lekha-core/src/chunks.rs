//! Splits page-level text units into overlapping word windows for embedding and search.

use crate::config::{ChunkingConfig, ConfigError};
use crate::text_unit::TextUnit;

/// Fixed-size word windows; each window after the first repeats the last
/// `overlap` words of the previous one.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails when the window could never advance (`overlap >= chunk_size`) or is empty.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(ConfigError::InvalidChunking {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk every unit. Chunk indices restart at 0 for each input unit.
    pub fn chunk(&self, units: &[TextUnit]) -> Vec<TextUnit> {
        units.iter().flat_map(|u| self.chunk_unit(u)).collect()
    }

    /// Chunk a single unit's content.
    pub fn chunk_unit(&self, unit: &TextUnit) -> Vec<TextUnit> {
        let words: Vec<&str> = unit.content().split_whitespace().collect();
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(unit.chunk(words[start..end].join(" "), chunks.len()));
            // A further window would hold nothing but overlap.
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}
