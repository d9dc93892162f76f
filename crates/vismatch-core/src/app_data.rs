//! Where vismatch stores its own data (config, index blob, product metadata).
//!
//! Catalog images stay wherever the user keeps them. We only store engine state here.

use std::path::PathBuf;

/// Returns the directory where vismatch stores config, the index and the catalog.
/// On Linux: `~/.local/share/vismatch/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Vismatch", "vismatch")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_a_directory() {
        if let Some(dir) = app_data_dir() {
            assert!(dir.is_dir());
        }
    }
}
