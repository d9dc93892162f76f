//! All matching logic independent of how it is served (CLI or a web handler).
//!
//! The heart is [`SimilarityEngine`]: an exact vector index and a product
//! catalog joined by position. Catalog images live wherever the user keeps
//! them; the engine stores its config, index blob and metadata in its own app
//! data directory (see [app_data]).

pub mod app_data;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod images;
pub mod ingest;
pub mod matching;
pub mod preprocess;
pub mod record;
pub mod vector_index;
pub mod watcher;

pub use app_data::app_data_dir;
pub use catalog::{CatalogError, CatalogStore};
pub use config::{
    get_catalog_root, load_config, load_config_from, save_config, set_catalog_root, Config,
    ConfigError,
};
pub use embedding::{l2_normalize, similarity_from_distance, squared_l2};
pub use engine::{EngineError, EngineState, SharedEngine, SimilarityEngine, StoragePaths};
pub use extract::{ExtractError, FeatureExtractor, PooledExtractor};
pub use images::{scan_images, ScanError};
pub use ingest::{ingest_directory, ingest_images, IngestError, IngestReport};
pub use matching::{filter_by_threshold, match_image, MatchError, MatchRequest, MatchResponse};
pub use preprocess::{ImageError, ImagePreprocessor, ImageSource, ImageTensor};
pub use record::{ProductRecord, ScoredProduct};
pub use vector_index::{IndexError, Neighbor, VectorIndex};
pub use watcher::{watch_catalog, WatchError};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "vismatch-core ready"
}
