// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact inner-product index over L2-normalized rows.

use std::ops::Range;

use ndarray::{ArrayView1, ArrayView2};

use crate::errors::{RagError, Result};
use crate::index::{
    check_dimension, l2_normalize, normalized, rank_top_k, IndexBackend, IndexSnapshot, ScoredRow,
    VectorIndex,
};

/// Dense row-major matrix of unit vectors.
///
/// Cosine similarity against every row is one matrix-vector product, with no
/// approximation.
pub struct ExactIndex {
    dimension: usize,
    rows: usize,
    data: Vec<f32>,
}

impl ExactIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: 0,
            data: Vec::new(),
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let rows = snapshot.rows();
        let mut data = snapshot.data;
        if !snapshot.normalized && snapshot.dimension > 0 {
            for row in data.chunks_exact_mut(snapshot.dimension) {
                l2_normalize(row);
            }
        }
        data.truncate(rows * snapshot.dimension);
        Self {
            dimension: snapshot.dimension,
            rows,
            data,
        }
    }

    fn matrix(&self) -> Result<ArrayView2<'_, f32>> {
        ArrayView2::from_shape((self.rows, self.dimension), &self.data).map_err(|_| {
            RagError::DimensionMismatch {
                expected: self.rows * self.dimension,
                actual: self.data.len(),
            }
        })
    }
}

impl VectorIndex for ExactIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Exact
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.rows
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        for vector in vectors {
            check_dimension(self.dimension, vector)?;
        }
        let start = self.rows;
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend(normalized(vector));
        }
        self.rows += vectors.len();
        Ok(start..self.rows)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>> {
        if k == 0 {
            return Err(RagError::InvalidTopK);
        }
        if self.rows == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.dimension, query)?;

        let query = normalized(query);
        let scores = self.matrix()?.dot(&ArrayView1::from(&query[..]));

        Ok(rank_top_k(scores.iter().copied(), k))
    }

    fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            dimension: self.dimension,
            normalized: true,
            data: self.data.clone(),
        }
    }
}
