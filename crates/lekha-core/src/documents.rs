//! Discovering source documents under a user-chosen directory.
//!
//! We only read the folder; nothing is written next to the documents.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Finds every file under `root` whose extension is in `extensions`
/// (lowercase, no dot). Hidden files and directories are skipped.
/// Sorted by path so ingestion order is stable.
pub fn discover_documents(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| ScanError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| extensions.contains(&e.to_ascii_lowercase().as_str()));
        if matches {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
}
