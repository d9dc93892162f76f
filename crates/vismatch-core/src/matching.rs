//! Answering a match request: image in, ranked and threshold-filtered products out.
//!
//! The similarity threshold is a presentation concern. It is applied here,
//! after the engine has scored and ranked candidates, never inside the index.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, SharedEngine};
use crate::extract::{ExtractError, FeatureExtractor};
use crate::preprocess::{ImageError, ImagePreprocessor, ImageSource};
use crate::record::ScoredProduct;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Per-request knobs. Missing fields take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRequest {
    pub top_k: usize,
    pub min_similarity: f32,
}

impl Default for MatchRequest {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    pub results: Vec<ScoredProduct>,
    pub count: usize,
}

/// Keep results scoring at least `min_similarity`. Order and ranks are kept.
pub fn filter_by_threshold(results: Vec<ScoredProduct>, min_similarity: f32) -> MatchResponse {
    let results: Vec<ScoredProduct> = results
        .into_iter()
        .filter(|r| r.similarity_score >= min_similarity)
        .collect();
    MatchResponse {
        count: results.len(),
        results,
    }
}

/// Preprocess, extract, search and filter for one image. An extractor whose
/// dimension differs from the engine's is rejected before any image work.
pub fn match_image(
    engine: &SharedEngine,
    preprocessor: &ImagePreprocessor,
    extractor: &dyn FeatureExtractor,
    source: &ImageSource,
    request: MatchRequest,
) -> Result<MatchResponse, MatchError> {
    let expected = engine.dimension();
    if extractor.dimension() != expected {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: extractor.dimension(),
        }
        .into());
    }
    let tensor = preprocessor.preprocess(source)?;
    let query = extractor.extract(&tensor)?;
    let scored = engine.search_similar(&query, request.top_k)?;
    let response = filter_by_threshold(scored, request.min_similarity);
    tracing::debug!(
        count = response.count,
        min_similarity = request.min_similarity,
        "match finished"
    );
    Ok(response)
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;
    use crate::engine::{SimilarityEngine, StoragePaths};
    use crate::extract::PooledExtractor;
    use crate::record::ProductRecord;

    fn scored(name: &str, score: f32, rank: usize) -> ScoredProduct {
        ScoredProduct {
            record: ProductRecord::new().with("name", name),
            similarity_score: score,
            rank,
        }
    }

    #[test]
    fn threshold_keeps_only_close_matches() {
        let results = vec![scored("v0", 1.0, 1), scored("v1", 1.0 / 3.0, 2)];
        let response = filter_by_threshold(results, 0.5);
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].record.name(), Some("v0"));
        assert_eq!(response.results[0].rank, 1);
    }

    #[test]
    fn threshold_is_inclusive() {
        let response = filter_by_threshold(vec![scored("edge", 0.7, 1)], 0.7);
        assert_eq!(response.count, 1);
    }

    #[test]
    fn request_defaults() {
        let req: MatchRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req, MatchRequest::default());
        assert_eq!(req.top_k, 10);
        let req: MatchRequest = serde_json::from_str(r#"{"min_similarity": 0.5}"#).unwrap();
        assert_eq!(req.top_k, 10);
        assert_eq!(req.min_similarity, 0.5);
    }

    #[test]
    fn matching_the_same_image_scores_one() {
        let dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(dir.path().join("i.bin"), dir.path().join("p.json"));
        let engine = SharedEngine::new(SimilarityEngine::new(64, paths).unwrap());
        let preprocessor = ImagePreprocessor::new().with_geometry(32, 32);
        let extractor = PooledExtractor::new(64);

        let encode = |color: [u8; 3]| {
            let mut buf = Cursor::new(Vec::new());
            RgbImage::from_fn(40, 40, |x, _| if x < 20 { Rgb(color) } else { Rgb([0, 0, 0]) })
                .write_to(&mut buf, ImageFormat::Png)
                .unwrap();
            ImageSource::Bytes(buf.into_inner())
        };
        for (name, color) in [("red", [255, 0, 0]), ("blue", [0, 0, 255])] {
            let tensor = preprocessor.preprocess(&encode(color)).unwrap();
            let vector = extractor.extract(&tensor).unwrap();
            engine
                .add_product(&vector, ProductRecord::new().with("name", name))
                .unwrap();
        }

        let response = match_image(
            &engine,
            &preprocessor,
            &extractor,
            &encode([0, 0, 255]),
            MatchRequest {
                top_k: 2,
                min_similarity: 0.0,
            },
        )
        .unwrap();
        assert_eq!(response.count, 2);
        assert_eq!(response.results[0].record.name(), Some("blue"));
        assert_eq!(response.results[0].similarity_score, 1.0);
        assert!(response.results[1].similarity_score < 1.0);
    }

    #[test]
    fn mismatched_extractor_fails_before_decoding() {
        let dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(dir.path().join("i.bin"), dir.path().join("p.json"));
        let engine = SharedEngine::new(SimilarityEngine::new(8, paths).unwrap());
        // Undecodable bytes: reaching the preprocessor would yield an image error instead.
        let err = match_image(
            &engine,
            &ImagePreprocessor::new(),
            &PooledExtractor::new(16),
            &ImageSource::Bytes(b"nope".to_vec()),
            MatchRequest::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MatchError::Engine(EngineError::DimensionMismatch { expected: 8, actual: 16 })
        ));
    }

    #[test]
    fn undecodable_upload_is_a_per_request_error() {
        let dir = TempDir::new().unwrap();
        let paths = StoragePaths::new(dir.path().join("i.bin"), dir.path().join("p.json"));
        let engine = SharedEngine::new(SimilarityEngine::new(8, paths).unwrap());
        let err = match_image(
            &engine,
            &ImagePreprocessor::new(),
            &PooledExtractor::new(8),
            &ImageSource::Bytes(b"nope".to_vec()),
            MatchRequest::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::Image(ImageError::Invalid(_))));
    }
}
