//! Vector math shared by the index and the extractors.
//!
//! Embeddings are plain `f32` slices. Producers are expected to hand over
//! unit-length vectors; nothing here enforces it.

/// Default embedding dimension (ResNet50 pooled features).
pub const DEFAULT_DIMENSION: usize = 2048;

/// Added to the norm before dividing so all-zero vectors stay finite.
pub const NORM_EPSILON: f32 = 1e-8;

/// Squared Euclidean distance. Both slices must have the same length.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Maps a squared distance to a score in (0, 1]. 1.0 means an exact match.
///
/// Strictly decreasing in `distance`, so ordering by ascending distance is the
/// same as ordering by descending similarity.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Scales `v` to unit length.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / (norm + NORM_EPSILON)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_l2_of_orthogonal_unit_vectors_is_two() {
        assert_eq!(squared_l2(&[1.0, 0.0, 0.0, 0.0], &[0.0, 1.0, 0.0, 0.0]), 2.0);
        assert_eq!(squared_l2(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn similarity_is_one_at_zero_and_decreasing() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        let mut prev = similarity_from_distance(0.0);
        for d in [0.01_f32, 0.5, 1.0, 2.0, 4.0, 100.0] {
            let s = similarity_from_distance(d);
            assert!(s < prev);
            assert!(s > 0.0 && s <= 1.0);
            prev = s;
        }
    }

    #[test]
    fn normalize_yields_unit_length() {
        let v = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
