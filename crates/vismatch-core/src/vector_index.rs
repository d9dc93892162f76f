//! Exact vector index over fixed-dimension embeddings. Supports append and
//! brute-force nearest-neighbor search by squared Euclidean distance.
//!
//! Positions are dense and append-only: the n-th vector added lives at
//! position n forever. The catalog relies on that to join metadata by position.

use std::cmp::Ordering;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::embedding::squared_l2;

/// Bumped whenever the on-disk blob layout changes.
const BLOB_VERSION: u32 = 1;

/// One search hit: position in the index and squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Append-only store of embeddings, laid out contiguously.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    /// `len() * dimension` floats, row-major.
    data: Vec<f32>,
}

#[derive(Serialize)]
struct IndexBlobRef<'a> {
    version: u32,
    dimension: u64,
    count: u64,
    data: &'a [f32],
}

/// Owned mirror of [`IndexBlobRef`]; the two must stay field-for-field equal.
#[derive(Serialize, Deserialize)]
struct IndexBlob {
    version: u32,
    dimension: u64,
    count: u64,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fails with [`IndexError::DimensionMismatch`] unless `vector.len() == dimension`.
    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Copy `vector` in and return its position (the previous length).
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        self.check_dimension(vector)?;
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Vector stored at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        let end = start.checked_add(self.dimension)?;
        self.data.get(start..end)
    }

    /// The `k` nearest vectors to `query`, closest first. Equal distances are
    /// ordered by lower position. Returns everything when `k >= len()` and
    /// nothing when the index is empty or `k == 0`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| Neighbor {
                position,
                distance: squared_l2(query, stored),
            })
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, nearest_first);
            scored.truncate(k);
        }
        scored.sort_unstable_by(nearest_first);
        Ok(scored)
    }

    /// Write the index as a versioned bincode blob.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), IndexError> {
        let blob = IndexBlobRef {
            version: BLOB_VERSION,
            dimension: self.dimension as u64,
            count: self.len() as u64,
            data: &self.data,
        };
        bincode::serialize_into(writer, &blob).map_err(IndexError::Encode)
    }

    /// Read a blob written by [`VectorIndex::write_to`]. Rejects unknown
    /// versions and blobs whose header disagrees with their payload.
    pub fn read_from<R: Read>(reader: R) -> Result<Self, IndexError> {
        let blob: IndexBlob = bincode::deserialize_from(reader).map_err(IndexError::Decode)?;
        if blob.version != BLOB_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported blob version {}",
                blob.version
            )));
        }
        let dimension = usize::try_from(blob.dimension)
            .map_err(|_| IndexError::Corrupt("dimension out of range".into()))?;
        let mut index = Self::new(dimension)?;
        let expected = blob
            .count
            .checked_mul(blob.dimension)
            .ok_or_else(|| IndexError::Corrupt("vector count overflows".into()))?;
        if blob.data.len() as u64 != expected {
            return Err(IndexError::Corrupt(format!(
                "header says {} vectors of dimension {}, payload has {} floats",
                blob.count,
                blob.dimension,
                blob.data.len()
            )));
        }
        index.data = blob.data;
        Ok(index)
    }
}

/// Total order: ascending distance, then ascending position.
fn nearest_first(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index dimension must be greater than zero")]
    ZeroDimension,
    #[error("failed to encode index: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode index: {0}")]
    Decode(bincode::Error),
    #[error("corrupt index blob: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(vectors: &[[f32; 4]]) -> VectorIndex {
        let mut index = VectorIndex::new(4).unwrap();
        for v in vectors {
            index.add(v).unwrap();
        }
        index
    }

    #[test]
    fn add_returns_sequential_positions() {
        let mut index = VectorIndex::new(2).unwrap();
        assert_eq!(index.add(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(index.add(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(&[0.0, 1.0][..]));
        assert_eq!(index.get(2), None);
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(4).unwrap();
        let err = index.add(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 4, actual: 2 }
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(VectorIndex::new(0), Err(IndexError::ZeroDimension)));
    }

    #[test]
    fn search_orders_by_distance() {
        let index = index_of(&[
            [0.0, 1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.6, 0.8, 0.0, 0.0],
        ]);
        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 0.0);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn ties_break_by_lower_position() {
        let index = index_of(&[
            [0.0, 1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
        ]);
        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 4).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 3, 0, 2]);

        let top = index.search(&[0.0, 1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(top[0].position, 0);
    }

    #[test]
    fn k_larger_than_len_returns_all() {
        let index = index_of(&[[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]]);
        assert_eq!(index.search(&[0.0, 0.0, 1.0, 0.0], 50).unwrap().len(), 2);
        assert!(index.search(&[0.0, 0.0, 1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_returns_no_hits() {
        let index = VectorIndex::new(4).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert!(index.search(&[1.0], 5).is_err());
    }

    #[test]
    fn blob_round_trip_is_exact() {
        let index = index_of(&[[0.1, 0.2, 0.3, 0.4], [f32::MIN_POSITIVE, -0.0, 1e-30, 7.5]]);
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        let loaded = VectorIndex::read_from(buf.as_slice()).unwrap();
        assert_eq!(loaded.dimension(), 4);
        assert_eq!(loaded.len(), 2);
        for p in 0..2 {
            let a = index.get(p).unwrap();
            let b = loaded.get(p).unwrap();
            assert!(a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()));
        }
    }

    #[test]
    fn blob_with_mismatched_header_is_corrupt() {
        let blob = IndexBlob {
            version: BLOB_VERSION,
            dimension: 4,
            count: 2,
            data: vec![0.0; 5],
        };
        let bytes = bincode::serialize(&blob).unwrap();
        assert!(matches!(
            VectorIndex::read_from(bytes.as_slice()),
            Err(IndexError::Corrupt(_))
        ));
    }

    #[test]
    fn truncated_blob_fails_to_decode() {
        let index = index_of(&[[1.0, 0.0, 0.0, 0.0]]);
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            VectorIndex::read_from(buf.as_slice()),
            Err(IndexError::Decode(_))
        ));
    }
}
