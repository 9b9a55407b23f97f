//! Where Lekha stores its own data (config, index artifacts).
//!
//! Source documents stay in the folder the user points us at. We only store app state here.

use std::path::PathBuf;

/// Returns the directory where Lekha stores config and the persisted index.
/// On Linux: `~/.local/share/lekha/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Lekha", "lekha")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Default location of the index artifacts: `<app data>/index`.
pub fn default_index_dir() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("index"))
}
