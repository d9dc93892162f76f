//! Product catalog: records in index-position order, persisted as one JSON array.

use std::io::{Read, Write};

use crate::record::ProductRecord;

/// Ordered product records. Position `i` pairs with vector `i` in the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogStore {
    records: Vec<ProductRecord>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its position. Query-time keys
    /// (`similarity_score`, `rank`) are dropped before storing.
    pub fn append(&mut self, mut record: ProductRecord) -> usize {
        if record.strip_reserved() {
            tracing::debug!("dropped query-time keys from appended record");
        }
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn get(&self, position: usize) -> Result<&ProductRecord, CatalogError> {
        self.records.get(position).ok_or(CatalogError::OutOfRange {
            position,
            len: self.records.len(),
        })
    }

    /// All records, unscored, in position order.
    pub fn all(&self) -> &[ProductRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pretty-printed JSON array. Array order is position order.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), CatalogError> {
        serde_json::to_writer_pretty(writer, &self.records).map_err(CatalogError::Serialize)
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut records: Vec<ProductRecord> =
            serde_json::from_reader(reader).map_err(CatalogError::Deserialize)?;
        for record in &mut records {
            record.strip_reserved();
        }
        Ok(Self { records })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog position {position} out of range (len {len})")]
    OutOfRange { position: usize, len: usize },
    #[error("failed to serialize catalog: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to parse catalog: {0}")]
    Deserialize(serde_json::Error),
}
