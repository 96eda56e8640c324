//! In-memory HNSW graph over packed pointers. A single writer lock
//! serializes `add_many` against concurrent searches; usearch itself allows
//! concurrent reads once a write finishes.

use parking_lot::RwLock;
use tracing::info;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::vector::Vector;

/// One search hit: a pointer and its squared-L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: i64,
    pub distance: f32,
}

pub struct HnswIndex {
    index: RwLock<Index>,
    dimension: usize,
}

impl HnswIndex {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let options = IndexOptions {
            dimensions: config.dimension,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: config.hnsw_m,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| AppError::Index(e.to_string()))?;
        index
            .reserve(1024)
            .map_err(|e| AppError::Index(e.to_string()))?;
        Ok(Self {
            index: RwLock::new(index),
            dimension: config.dimension,
        })
    }

    /// Adds every vector's pointer and embedding to the graph under a single
    /// writer-lock acquisition.
    pub fn add_many(&self, vectors: &[Vector]) -> Result<(), AppError> {
        for v in vectors {
            if v.values.len() != self.dimension {
                return Err(AppError::DimensionMismatch {
                    expected: self.dimension,
                    got: v.values.len(),
                });
            }
            if v.values.iter().any(|x| !x.is_finite()) {
                return Err(AppError::InvalidVector(
                    "embedding contains a non-finite value".to_string(),
                ));
            }
        }
        let index = self.index.write();
        let needed = index.size() + vectors.len();
        if needed > index.capacity() {
            index
                .reserve(needed)
                .map_err(|e| AppError::Index(e.to_string()))?;
        }
        for v in vectors {
            let id = v.id()?;
            index
                .add(id as u64, &v.values)
                .map_err(|e| AppError::Index(e.to_string()))?;
        }
        info!(added = vectors.len(), size = index.size(), "index_size");
        Ok(())
    }

    /// Returns the `k` nearest pointers to `query`, ordered by ascending
    /// squared-L2 distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, AppError> {
        if query.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        let index = self.index.read();
        let matches = index
            .search(query, k)
            .map_err(|e| AppError::Index(e.to_string()))?;
        Ok(matches
            .keys
            .into_iter()
            .zip(matches.distances)
            .map(|(key, distance)| Hit {
                id: key as i64,
                distance,
            })
            .collect())
    }

    /// Over-fetches and filters to only pointers strictly below `threshold`,
    /// since the underlying index has no native threshold search.
    pub fn search_within(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<Hit>, AppError> {
        let search_k = (k * 2).max(50);
        let mut hits = self.search(query, search_k)?;
        hits.retain(|h| h.distance < threshold);
        hits.truncate(k);
        Ok(hits)
    }

    /// Runs one independent search per row of `queries`, optionally filtered
    /// to a threshold, preserving query order in the returned vector.
    pub fn multi_search(
        &self,
        queries: &[Vec<f32>],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<Vec<Hit>>, AppError> {
        queries
            .iter()
            .map(|query| match threshold {
                Some(t) => self.search_within(query, k, t),
                None => self.search(query, k),
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.index.read().size()
    }

    /// Snapshot of the graph's current shape, for observability.
    pub fn info(&self) -> IndexInfo {
        let index = self.index.read();
        IndexInfo {
            size: index.size(),
            capacity: index.capacity(),
            dimension: self.dimension,
        }
    }
}

/// Observability snapshot of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
    pub size: usize,
    pub capacity: usize,
    pub dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Metadata;

    fn config() -> AppConfig {
        let mut c = AppConfig::default();
        c.dimension = 2;
        c
    }

    fn vector(document: u32, chunk: u32, offset: u32, values: Vec<f32>) -> Vector {
        Vector::new(values, document, chunk, offset, Metadata::new())
    }

    #[test]
    fn search_returns_nearest_first() {
        let index = HnswIndex::new(&config()).unwrap();
        index
            .add_many(&[
                vector(1, 0, 0, vec![0.0, 0.0]),
                vector(1, 0, 1, vec![10.0, 10.0]),
            ])
            .unwrap();
        let hits = index.search(&[0.1, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn add_many_rejects_dimension_mismatch() {
        let index = HnswIndex::new(&config()).unwrap();
        let err = index
            .add_many(&[vector(1, 0, 0, vec![0.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { .. }));
    }

    #[test]
    fn search_within_filters_by_threshold() {
        let index = HnswIndex::new(&config()).unwrap();
        index
            .add_many(&[
                vector(1, 0, 0, vec![0.0, 0.0]),
                vector(1, 0, 1, vec![10.0, 10.0]),
            ])
            .unwrap();
        let hits = index.search_within(&[0.0, 0.0], 10, 1.0).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn multi_search_preserves_query_order() {
        let index = HnswIndex::new(&config()).unwrap();
        let near = vector(1, 0, 0, vec![0.0, 0.0]);
        let far = vector(1, 0, 1, vec![10.0, 10.0]);
        index.add_many(&[near.clone(), far.clone()]).unwrap();
        let results = index
            .multi_search(&[vec![0.0, 0.0], vec![10.0, 10.0]], 1, None)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0].id, near.id().unwrap());
        assert_eq!(results[1][0].id, far.id().unwrap());
    }

    #[test]
    fn multi_search_applies_threshold_per_query() {
        let index = HnswIndex::new(&config()).unwrap();
        index
            .add_many(&[
                vector(1, 0, 0, vec![0.0, 0.0]),
                vector(1, 0, 1, vec![10.0, 10.0]),
            ])
            .unwrap();
        let results = index
            .multi_search(&[vec![0.0, 0.0]], 10, Some(1.0))
            .unwrap();
        assert_eq!(results[0].len(), 1);
    }

    #[test]
    fn info_reports_size_and_dimension() {
        let index = HnswIndex::new(&config()).unwrap();
        index.add_many(&[vector(1, 0, 0, vec![0.0, 0.0])]).unwrap();
        let info = index.info();
        assert_eq!(info.size, 1);
        assert_eq!(info.dimension, 2);
        assert!(info.capacity >= info.size);
    }
}
