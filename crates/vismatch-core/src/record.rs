//! Product metadata as stored in the catalog and as returned from a search.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys the engine attaches at query time. Never persisted.
pub const SCORE_KEY: &str = "similarity_score";
pub const RANK_KEY: &str = "rank";

/// One catalog entry: free-form string keys to JSON scalars.
///
/// The record at catalog position `i` describes the vector at index position
/// `i`; there is no id-based join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductRecord(Map<String, Value>);

impl ProductRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// The metadata the ingestion pipeline builds for a catalog image.
    pub fn product(
        id: u64,
        name: impl Into<String>,
        category: impl Into<String>,
        image_path: impl Into<String>,
        price: f64,
        description: impl Into<String>,
    ) -> Self {
        Self::new()
            .with("id", id)
            .with("name", name.into())
            .with("category", category.into())
            .with("image_path", image_path.into())
            .with("price", price)
            .with("description", description.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn image_path(&self) -> Option<&str> {
        self.get_str("image_path")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Drops query-time keys. Returns true if anything was removed.
    pub(crate) fn strip_reserved(&mut self) -> bool {
        let score = self.0.remove(SCORE_KEY).is_some();
        let rank = self.0.remove(RANK_KEY).is_some();
        score || rank
    }
}

impl From<Map<String, Value>> for ProductRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A catalog record with its score and 1-based rank for one query.
/// Serializes flat, so the JSON looks like the record plus two extra keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    #[serde(flatten)]
    pub record: ProductRecord,
    pub similarity_score: f32,
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_has_all_default_fields() {
        let r = ProductRecord::product(3, "mug", "general", "imgs/mug.jpg", 0.0, "Product 4");
        assert_eq!(r.name(), Some("mug"));
        assert_eq!(r.image_path(), Some("imgs/mug.jpg"));
        assert_eq!(r.get("id"), Some(&Value::from(3u64)));
        assert_eq!(r.fields().len(), 6);
    }

    #[test]
    fn strip_reserved_removes_query_keys() {
        let mut r = ProductRecord::new()
            .with("name", "lamp")
            .with(SCORE_KEY, 0.9)
            .with(RANK_KEY, 1);
        assert!(r.strip_reserved());
        assert_eq!(r.fields().len(), 1);
        assert!(!r.strip_reserved());
    }

    #[test]
    fn scored_product_serializes_flat() {
        let scored = ScoredProduct {
            record: ProductRecord::new().with("name", "chair"),
            similarity_score: 1.0,
            rank: 1,
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["name"], "chair");
        assert_eq!(json["similarity_score"], 1.0);
        assert_eq!(json["rank"], 1);
    }
}
