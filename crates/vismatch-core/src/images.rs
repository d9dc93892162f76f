//! Discovering catalog images in a user-chosen directory.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scans `root` for image files whose extension (case-insensitive) is in
/// `allowed_extensions`. Hidden files and directories are skipped. Results are
/// sorted by path so repeated ingestion assigns positions in the same order.
pub fn scan_images(root: &Path, allowed_extensions: &[String]) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let mut images = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| ScanError::Walk(e.to_string()))?;
        let path = entry.path();
        if entry.file_type().is_file() && has_allowed_extension(path, allowed_extensions) {
            images.push(path.to_path_buf());
        }
    }
    images.sort();
    Ok(images)
}

pub fn has_allowed_extension(path: &Path, allowed_extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
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

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn exts() -> Vec<String> {
        vec!["png".into(), "jpg".into(), "jpeg".into()]
    }

    #[test]
    fn finds_images_sorted_and_skips_others() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir(root.join("shoes")).unwrap();
        std::fs::create_dir(root.join(".cache")).unwrap();
        for f in ["b.PNG", "a.jpg", "notes.txt", "shoes/c.jpeg", ".cache/d.png", ".e.png"] {
            std::fs::write(root.join(f), b"x").unwrap();
        }

        let found = scan_images(root, &exts()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "shoes/c.jpeg"]);
    }

    #[test]
    fn not_a_directory() {
        let err = scan_images(Path::new("/definitely/not/here"), &exts()).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_allowed_extension(Path::new("x.JPG"), &exts()));
        assert!(!has_allowed_extension(Path::new("x.gif"), &exts()));
        assert!(!has_allowed_extension(Path::new("noext"), &exts()));
    }
}
