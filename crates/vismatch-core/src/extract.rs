//! Feature extraction seam: image tensor in, unit-length embedding out.
//!
//! The production extractor is a frozen pretrained backbone living outside
//! this crate. [`PooledExtractor`] is a deterministic stand-in so the
//! pipeline runs end to end without a model.

use crate::embedding::l2_normalize;
use crate::preprocess::ImageTensor;

/// Turns a preprocessed image into an embedding of fixed dimension.
///
/// Implementations must be deterministic for a given input and free of side
/// effects, and should return L2-normalized vectors.
pub trait FeatureExtractor: Send + Sync {
    fn dimension(&self) -> usize;

    fn extract(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ExtractError>;
}

/// Average-pools the flattened tensor into `dimension` contiguous bins, then
/// normalizes. Crude, but stable: identical images give identical vectors.
#[derive(Debug, Clone)]
pub struct PooledExtractor {
    dimension: usize,
}

impl PooledExtractor {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl FeatureExtractor for PooledExtractor {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn extract(&self, tensor: &ImageTensor) -> Result<Vec<f32>, ExtractError> {
        let len = tensor.len();
        if self.dimension == 0 || len < self.dimension {
            return Err(ExtractError::TensorTooSmall {
                len,
                dimension: self.dimension,
            });
        }
        let pooled: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let start = i * len / self.dimension;
                let end = (i + 1) * len / self.dimension;
                let bin = &tensor.data[start..end];
                bin.iter().sum::<f32>() / bin.len() as f32
            })
            .collect();
        Ok(l2_normalize(&pooled))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("tensor of {len} values cannot produce {dimension} features")]
    TensorTooSmall { len: usize, dimension: usize },
    #[error("feature extraction failed: {0}")]
    Model(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(data: Vec<f32>) -> ImageTensor {
        ImageTensor {
            height: 1,
            width: (data.len() / 3) as u32,
            data,
        }
    }

    #[test]
    fn pools_into_requested_dimension() {
        let t = tensor(vec![1.0, 1.0, 3.0, 3.0, 0.0, 0.0]);
        let v = PooledExtractor::new(3).extract(&t).unwrap();
        assert_eq!(v.len(), 3);
        // Bin means are (1, 3, 0); normalized by sqrt(10).
        assert!((v[0] - 1.0 / 10f32.sqrt()).abs() < 1e-6);
        assert!((v[1] - 3.0 / 10f32.sqrt()).abs() < 1e-6);
        assert_eq!(v[2], 0.0);
    }

    #[test]
    fn output_is_unit_length_and_deterministic() {
        let data: Vec<f32> = (0..300).map(|i| (i as f32 * 0.37).sin()).collect();
        let extractor = PooledExtractor::new(16);
        let a = extractor.extract(&tensor(data.clone())).unwrap();
        let b = extractor.extract(&tensor(data)).unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn too_small_tensor_is_an_error() {
        let err = PooledExtractor::new(8).extract(&tensor(vec![0.0; 6])).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::TensorTooSmall { len: 6, dimension: 8 }
        ));
    }
}
