//! Plain text and markdown: the whole file is a single page.

use std::path::Path;

use super::{source_id, LoadError, Loader};
use crate::text_unit::TextUnit;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFileLoader;

impl Loader for TextFileLoader {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md"]
    }

    fn load(&self, path: &Path) -> Result<Vec<TextUnit>, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![TextUnit::page(source_id(path), 1, raw)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_becomes_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "some notes\nover two lines").unwrap();
        let units = TextFileLoader.load(&path).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].page_number(), Some(1));
        assert_eq!(units[0].source(), Some(path.to_string_lossy().as_ref()));
    }

    #[test]
    fn blank_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.md");
        std::fs::write(&path, " \n\n").unwrap();
        assert!(TextFileLoader.load(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(
            TextFileLoader.load(Path::new("/nope/missing.txt")),
            Err(LoadError::Read(..))
        ));
    }
}
