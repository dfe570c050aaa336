// SPDX-License-Identifier: MIT OR Apache-2.0

//! Linear-scan cosine index.
//!
//! Rows are kept exactly as they were added. Each search normalizes the query
//! once and every row on the fly, then takes the inner product, which is the
//! same formula the exact backend applies to its pre-normalized matrix.

use std::ops::Range;

use crate::errors::{RagError, Result};
use crate::index::{
    check_dimension, normalized, rank_top_k, IndexBackend, IndexSnapshot, ScoredRow, VectorIndex,
};

pub struct BruteForceIndex {
    dimension: usize,
    rows: Vec<Vec<f32>>,
}

impl BruteForceIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let rows = if snapshot.dimension == 0 {
            Vec::new()
        } else {
            snapshot
                .data
                .chunks_exact(snapshot.dimension)
                .map(<[f32]>::to_vec)
                .collect()
        };
        Self {
            dimension: snapshot.dimension,
            rows,
        }
    }

    /// Stored row as it was added.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        self.rows.get(row).map(Vec::as_slice)
    }
}

impl VectorIndex for BruteForceIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::BruteForce
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.rows.len()
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        for vector in vectors {
            check_dimension(self.dimension, vector)?;
        }
        let start = self.rows.len();
        self.rows.extend(vectors.iter().cloned());
        Ok(start..self.rows.len())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>> {
        if k == 0 {
            return Err(RagError::InvalidTopK);
        }
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }
        check_dimension(self.dimension, query)?;

        let query = normalized(query);
        let scores = self.rows.iter().map(|row| {
            normalized(row)
                .iter()
                .zip(query.iter())
                .map(|(a, b)| a * b)
                .sum::<f32>()
        });

        Ok(rank_top_k(scores, k))
    }

    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            dimension: self.dimension,
            normalized: false,
            data: self.rows.iter().flatten().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_search() {
        let mut index = BruteForceIndex::new(3);

        let ids = index
            .add(&[vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        assert_eq!(ids, 0..3);
        assert_eq!(index.count(), 3);

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].row, 0);
        assert!((results[0].score - 1.0).abs() < 1e-6);

        assert_eq!(results[1].row, 1);
        assert!(results[1].score > 0.9);
    }

    #[test]
    fn test_scores_ignore_magnitude() {
        let mut index = BruteForceIndex::new(2);
        index.add(&[vec![10.0, 0.0], vec![0.0, 0.5]]).unwrap();

        let results = index.search(&[3.0, 0.0], 1).unwrap();
        assert_eq!(results[0].row, 0);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = BruteForceIndex::new(3);
        let result = index.add(&[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]]);
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        // Nothing from the rejected batch was stored.
        assert_eq!(index.count(), 0);

        index.add(&[vec![1.0, 0.0, 0.0]]).unwrap();
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_empty_search_and_zero_k() {
        let index = BruteForceIndex::new(4);
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0, 0.0], 0),
            Err(RagError::InvalidTopK)
        ));
    }

    #[test]
    fn test_snapshot_keeps_raw_rows() {
        let mut index = BruteForceIndex::new(2);
        index.add(&[vec![3.0, 4.0]]).unwrap();

        let snapshot = index.snapshot();
        assert!(!snapshot.normalized);
        assert_eq!(snapshot.data, vec![3.0, 4.0]);

        let restored = BruteForceIndex::from_snapshot(snapshot);
        assert_eq!(restored.row(0), Some(&[3.0, 4.0][..]));
    }
}
