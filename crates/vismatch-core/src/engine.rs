//! The similarity engine: vector index and product catalog kept in lockstep.
//!
//! Every vector at index position `i` is described by the catalog record at
//! position `i`. All mutation goes through [`SimilarityEngine`], which keeps
//! both stores the same length, and [`SharedEngine`] puts a single
//! reader/writer lock around it for use from concurrent request handlers.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogStore};
use crate::embedding::similarity_from_distance;
use crate::record::{ProductRecord, ScoredProduct};
use crate::vector_index::{IndexError, VectorIndex};

/// Where the two coupled artifacts live. Always written and read together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    /// Binary vector index blob.
    pub index: PathBuf,
    /// JSON array of product records.
    pub metadata: PathBuf,
}

impl StoragePaths {
    pub fn new(index: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            metadata: metadata.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Empty,
    Populated,
}

/// Index + catalog with a single public contract: add, search, list, persist, reload.
#[derive(Debug)]
pub struct SimilarityEngine {
    index: VectorIndex,
    catalog: CatalogStore,
    paths: StoragePaths,
}

impl SimilarityEngine {
    /// Fresh, empty engine. Nothing is read from disk.
    pub fn new(dimension: usize, paths: StoragePaths) -> Result<Self, EngineError> {
        Ok(Self {
            index: VectorIndex::new(dimension)?,
            catalog: CatalogStore::new(),
            paths,
        })
    }

    /// New engine populated from `paths` if the artifacts exist.
    pub fn open(dimension: usize, paths: StoragePaths) -> Result<Self, EngineError> {
        let mut engine = Self::new(dimension, paths)?;
        engine.reload()?;
        Ok(engine)
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Number of products (equal to the number of vectors).
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    pub fn state(&self) -> EngineState {
        if self.is_empty() {
            EngineState::Empty
        } else {
            EngineState::Populated
        }
    }

    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    pub fn record_count(&self) -> usize {
        self.catalog.len()
    }

    /// Add one product. Either both the vector and the record are stored, or
    /// neither is. Returns the product's position.
    pub fn add_product(
        &mut self,
        vector: &[f32],
        metadata: ProductRecord,
    ) -> Result<usize, EngineError> {
        // Validate before touching either store; after this nothing can fail.
        self.index.check_dimension(vector)?;
        let position = self.index.add(vector)?;
        let record_position = self.catalog.append(metadata);
        debug_assert_eq!(position, record_position);

        if position == 0 {
            info!("engine populated with first product");
        }
        debug!(position, "added product");
        Ok(position)
    }

    /// Nearest products to `query`, best first, with score and 1-based rank.
    ///
    /// An empty engine yields an empty list. Index hits that point past the
    /// catalog are skipped and logged. Ranks number the returned entries with
    /// no gaps; they are not raw index hit positions, so a skipped hit does
    /// not leave a hole in the sequence.
    pub fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredProduct>, EngineError> {
        let neighbors = self.index.search(query, top_k)?;
        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let record = match self.catalog.get(neighbor.position) {
                Ok(record) => record,
                Err(e) => {
                    warn!("skipping search hit: {}", e);
                    continue;
                }
            };
            results.push(ScoredProduct {
                record: record.clone(),
                similarity_score: similarity_from_distance(neighbor.distance),
                rank: results.len() + 1,
            });
        }
        Ok(results)
    }

    /// All products, unscored, in insertion order.
    pub fn list_all(&self) -> &[ProductRecord] {
        self.catalog.all()
    }

    pub fn get_product(&self, position: usize) -> Result<&ProductRecord, EngineError> {
        Ok(self.catalog.get(position)?)
    }

    /// True if some record's `image_path` equals `image_path`.
    pub fn contains_image(&self, image_path: &str) -> bool {
        self.catalog
            .all()
            .iter()
            .any(|r| r.image_path() == Some(image_path))
    }

    /// Write both artifacts. Each is written to a sibling temp file and then
    /// renamed over the target.
    pub fn persist(&self) -> Result<(), EngineError> {
        write_atomic(&self.paths.index, |w| Ok(self.index.write_to(w)?))?;
        write_atomic(&self.paths.metadata, |w| Ok(self.catalog.write_to(w)?))?;
        info!(
            products = self.len(),
            index = %self.paths.index.display(),
            metadata = %self.paths.metadata.display(),
            "persisted engine"
        );
        Ok(())
    }

    /// Replace in-memory state with the artifacts on disk.
    ///
    /// Both missing resets to empty, discarding (with a warning) anything
    /// held in memory. One missing, a dimension that differs
    /// from this engine's, or artifacts of different lengths are errors, and
    /// leave the current state untouched.
    pub fn reload(&mut self) -> Result<(), EngineError> {
        let index_exists = self.paths.index.exists();
        let metadata_exists = self.paths.metadata.exists();
        match (index_exists, metadata_exists) {
            (false, false) => {
                if self.is_empty() {
                    debug!("no persisted artifacts; starting empty");
                } else {
                    warn!(
                        discarded = self.len(),
                        "no persisted artifacts; discarding in-memory products"
                    );
                }
                self.index = VectorIndex::new(self.dimension())?;
                self.catalog = CatalogStore::new();
                return Ok(());
            }
            (true, false) => {
                return Err(EngineError::MissingArtifact(self.paths.metadata.clone()));
            }
            (false, true) => {
                return Err(EngineError::MissingArtifact(self.paths.index.clone()));
            }
            (true, true) => {}
        }

        let index = VectorIndex::read_from(BufReader::new(open(&self.paths.index)?))?;
        let catalog = CatalogStore::read_from(BufReader::new(open(&self.paths.metadata)?))?;

        if index.dimension() != self.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension(),
                actual: index.dimension(),
            });
        }
        if index.len() != catalog.len() {
            return Err(EngineError::CorruptState {
                vectors: index.len(),
                records: catalog.len(),
            });
        }

        self.index = index;
        self.catalog = catalog;
        info!(products = self.len(), "reloaded engine");
        Ok(())
    }
}

fn open(path: &Path) -> Result<File, EngineError> {
    File::open(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    let io_err = |source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = File::create(&tmp).map_err(io_err).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush().map_err(io_err)?;
        drop(writer);
        std::fs::rename(&tmp, path).map_err(io_err)
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Engine behind one reader/writer lock. Searches and listings share the lock;
/// adds, persists and reloads hold it exclusively, so no reader ever sees the
/// index and catalog at different lengths.
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<SimilarityEngine>>,
}

impl SharedEngine {
    pub fn new(engine: SimilarityEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn add_product(&self, vector: &[f32], metadata: ProductRecord) -> Result<usize, EngineError> {
        self.inner.write().add_product(vector, metadata)
    }

    pub fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredProduct>, EngineError> {
        self.inner.read().search_similar(query, top_k)
    }

    pub fn list_all(&self) -> Vec<ProductRecord> {
        self.inner.read().list_all().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn dimension(&self) -> usize {
        self.inner.read().dimension()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn persist(&self) -> Result<(), EngineError> {
        self.inner.write().persist()
    }

    pub fn reload(&self) -> Result<(), EngineError> {
        self.inner.write().reload()
    }

    /// Shared access for several reads under one consistent view.
    pub fn read(&self) -> RwLockReadGuard<'_, SimilarityEngine> {
        self.inner.read()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    OutOfRange(CatalogError),
    #[error("corrupt state: index holds {vectors} vectors but catalog holds {records} records")]
    CorruptState { vectors: usize, records: usize },
    #[error("corrupt state: companion artifact missing: {0}")]
    MissingArtifact(PathBuf),
    #[error("index error: {0}")]
    Index(IndexError),
    #[error("catalog error: {0}")]
    Catalog(CatalogError),
    #[error("io error for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<IndexError> for EngineError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::DimensionMismatch { expected, actual } => {
                EngineError::DimensionMismatch { expected, actual }
            }
            other => EngineError::Index(other),
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        if matches!(e, CatalogError::OutOfRange { .. }) {
            EngineError::OutOfRange(e)
        } else {
            EngineError::Catalog(e)
        }
    }
}
