//! File watcher for the catalog image directory. Re-scans when files change.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify_debouncer_mini::notify;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};

use crate::images::{scan_images, ScanError};

/// Quiet period before a burst of file events is reported as one change.
pub const DEBOUNCE: Duration = Duration::from_millis(400);

/// Watches `root` and calls `on_change` with a fresh image list whenever files
/// change (debounced). Blocks until the process is stopped (e.g. Ctrl+C).
/// Returns Err on setup failure.
pub fn watch_catalog(
    root: &Path,
    allowed_extensions: Vec<String>,
    on_change: impl Fn(Result<Vec<PathBuf>, ScanError>) + Send + 'static,
) -> Result<(), WatchError> {
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }
    let root = root.canonicalize().map_err(WatchError::Canonicalize)?;
    let root_for_callback = root.clone();

    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
        Ok(events) => {
            tracing::debug!(events = events.len(), "catalog directory changed");
            on_change(scan_images(&root_for_callback, &allowed_extensions));
        }
        Err(e) => tracing::error!("watcher error: {}", e),
    })
    .map_err(|e| WatchError::Notify(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, notify::RecursiveMode::Recursive)
        .map_err(|e| WatchError::Watch(e.to_string()))?;
    tracing::info!(root = %root.display(), "watching catalog directory");

    let (_tx, rx) = mpsc::channel::<()>();
    rx.recv().ok();
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
}
