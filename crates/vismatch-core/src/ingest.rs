//! Ingestion pipeline: scan → preprocess → extract → add. Populates the engine
//! from a directory of catalog images.
//!
//! One bad image never stops the run: each failure is recorded in the
//! [`IngestReport`] and the next file is processed.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::engine::{EngineError, SharedEngine};
use crate::extract::{ExtractError, FeatureExtractor};
use crate::images::{scan_images, ScanError};
use crate::preprocess::{ImageError, ImagePreprocessor};
use crate::record::ProductRecord;

pub const DEFAULT_CATEGORY: &str = "general";

/// What happened to each file in an ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub added: Vec<PathBuf>,
    /// Already in the catalog (same `image_path`).
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, IngestError)>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.added.len() + self.skipped.len() + self.failed.len()
    }
}

/// Ingest every image under `root`, then persist if anything was added.
/// Only a failed scan, an extractor whose dimension differs from the engine's,
/// or a failed persist aborts the whole run.
pub fn ingest_directory(
    engine: &SharedEngine,
    root: &Path,
    allowed_extensions: &[String],
    preprocessor: &ImagePreprocessor,
    extractor: &dyn FeatureExtractor,
) -> Result<IngestReport, IngestError> {
    let expected = engine.dimension();
    if extractor.dimension() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: extractor.dimension(),
        }
        .into());
    }
    // Same absolute root as the watcher uses, so stored image paths agree.
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let images = scan_images(&root, allowed_extensions)?;
    info!(count = images.len(), root = %root.display(), "found catalog images");

    let report = ingest_images(engine, &images, preprocessor, extractor);
    if !report.added.is_empty() {
        engine.persist()?;
    }
    info!(
        added = report.added.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "ingestion finished"
    );
    Ok(report)
}

/// Ingest the given files in order. Never fails as a whole; does not persist.
/// Paths are stored canonicalized, so the same file reached through different
/// spellings is only added once.
pub fn ingest_images(
    engine: &SharedEngine,
    images: &[PathBuf],
    preprocessor: &ImagePreprocessor,
    extractor: &dyn FeatureExtractor,
) -> IngestReport {
    let mut report = IngestReport::default();
    for path in images {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if engine.read().contains_image(&canonical.to_string_lossy()) {
            report.skipped.push(path.clone());
            continue;
        }
        match ingest_one(engine, &canonical, preprocessor, extractor) {
            Ok(_) => report.added.push(path.clone()),
            Err(e) => {
                warn!("failed to ingest {}: {}", path.display(), e);
                report.failed.push((path.clone(), e));
            }
        }
    }
    report
}

fn ingest_one(
    engine: &SharedEngine,
    path: &Path,
    preprocessor: &ImagePreprocessor,
    extractor: &dyn FeatureExtractor,
) -> Result<usize, IngestError> {
    let tensor = preprocessor.preprocess_path(path)?;
    let features = extractor.extract(&tensor)?;
    // Single writer: nothing else adds between reading len and adding.
    let id = engine.len() as u64;
    let metadata = default_metadata(id, path);
    Ok(engine.add_product(&features, metadata)?)
}

/// Metadata for an image with nothing but a file name to go on.
pub fn default_metadata(id: u64, path: &Path) -> ProductRecord {
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    ProductRecord::product(
        id,
        name,
        DEFAULT_CATEGORY,
        path.to_string_lossy(),
        0.0,
        format!("Product {}", id + 1),
    )
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}
