// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index, metadata store and their on-disk artifacts.
//!
//! Two index backends sit behind [`VectorIndex`]:
//!
//! - [`ExactIndex`] keeps L2-normalized rows in one dense matrix and scores a
//!   query with a single matrix-vector product (feature `accelerate`).
//! - [`BruteForceIndex`] keeps raw rows and recomputes cosine similarity row by
//!   row. It produces the same rankings and is always available.
//!
//! Row `i` of the index and record `i` of the [`MetadataStore`] describe the same
//! chunk. [`Corpus`] is the only type that mutates both.

pub mod brute;
pub mod corpus;
#[cfg(feature = "accelerate")]
pub mod exact;
pub mod metadata;
pub mod persist;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};

pub use brute::BruteForceIndex;
pub use corpus::{Corpus, RetrievedChunk};
#[cfg(feature = "accelerate")]
pub use exact::ExactIndex;
pub use metadata::{ChunkRecord, MetadataStore};
pub use persist::ArtifactPaths;

/// One search hit: the row id and its cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredRow {
    pub row: usize,
    pub score: f32,
}

/// Raw contents of an index, used by persistence and to copy an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub dimension: usize,
    /// Whether every stored row is already L2-normalized.
    pub normalized: bool,
    /// Row-major vector data, `rows * dimension` values.
    pub data: Vec<f32>,
}

impl IndexSnapshot {
    pub fn rows(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }
}

/// Nearest-neighbor index over fixed-dimension vectors.
pub trait VectorIndex: Send + Sync {
    /// Backend that implements this index.
    fn backend(&self) -> IndexBackend;

    /// Vector dimension accepted by this index.
    fn dimension(&self) -> usize;

    /// Number of stored rows.
    fn count(&self) -> usize;

    /// Appends rows in input order and returns their ids.
    ///
    /// The batch is validated before anything is stored, so a failed call
    /// leaves the index untouched.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>>;

    /// Returns at most `min(k, count)` rows by descending score, ties by row id.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>>;

    /// Copies the stored rows out for persistence.
    fn snapshot(&self) -> IndexSnapshot;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Index implementation, picked once when an index is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    Exact,
    BruteForce,
}

impl IndexBackend {
    /// Whether the exact matrix backend was compiled in.
    pub const fn accelerated() -> bool {
        cfg!(feature = "accelerate")
    }

    /// Best backend available in this build.
    pub fn detect() -> Self {
        if Self::accelerated() {
            Self::Exact
        } else {
            Self::BruteForce
        }
    }

    /// Resolves a configured preference against what this build supports.
    pub fn resolve(preference: BackendPreference) -> Self {
        match preference {
            BackendPreference::Auto => Self::detect(),
            BackendPreference::BruteForce => Self::BruteForce,
            BackendPreference::Exact => {
                if !Self::accelerated() {
                    tracing::warn!(
                        "exact index requested but built without the `accelerate` feature; using brute force"
                    );
                }
                Self::detect()
            }
        }
    }

    /// Creates an empty index of this backend.
    pub fn create(self, dimension: usize) -> Box<dyn VectorIndex> {
        match self {
            #[cfg(feature = "accelerate")]
            Self::Exact => Box::new(ExactIndex::new(dimension)),
            #[cfg(not(feature = "accelerate"))]
            Self::Exact => Box::new(BruteForceIndex::new(dimension)),
            Self::BruteForce => Box::new(BruteForceIndex::new(dimension)),
        }
    }

    /// Rebuilds an index of this backend from a snapshot.
    pub fn restore(self, snapshot: IndexSnapshot) -> Box<dyn VectorIndex> {
        match self {
            #[cfg(feature = "accelerate")]
            Self::Exact => Box::new(ExactIndex::from_snapshot(snapshot)),
            #[cfg(not(feature = "accelerate"))]
            Self::Exact => Box::new(BruteForceIndex::from_snapshot(snapshot)),
            Self::BruteForce => Box::new(BruteForceIndex::from_snapshot(snapshot)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::BruteForce => "brute_force",
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend requested in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    #[default]
    Auto,
    Exact,
    #[serde(alias = "brute")]
    BruteForce,
}

impl FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "exact" => Ok(Self::Exact),
            "brute" | "brute_force" | "brute-force" => Ok(Self::BruteForce),
            other => Err(format!("unknown index backend '{other}'")),
        }
    }
}

/// Scales `vector` to unit length in place. Zero vectors are left as they are.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

pub(crate) fn normalized(vector: &[f32]) -> Vec<f32> {
    let mut out = vector.to_vec();
    l2_normalize(&mut out);
    out
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Sorts scores into the canonical ranking and keeps the best `k`.
pub(crate) fn rank_top_k(scores: impl IntoIterator<Item = f32>, k: usize) -> Vec<ScoredRow> {
    let mut ranked: Vec<ScoredRow> = scores
        .into_iter()
        .enumerate()
        .map(|(row, score)| ScoredRow { row, score })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.row.cmp(&b.row)));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rank_breaks_ties_by_row() {
        let ranked = rank_top_k(vec![0.5, 0.9, 0.5, 0.9], 4);
        let rows: Vec<usize> = ranked.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_rank_truncates() {
        let ranked = rank_top_k(vec![0.1, 0.2, 0.3], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].row, 2);
    }

    #[test]
    fn test_backend_preference_parse() {
        assert_eq!("auto".parse::<BackendPreference>().unwrap(), BackendPreference::Auto);
        assert_eq!("brute".parse::<BackendPreference>().unwrap(), BackendPreference::BruteForce);
        assert!("hnsw".parse::<BackendPreference>().is_err());
    }

    #[test]
    fn test_brute_force_preference_is_honored() {
        assert_eq!(
            IndexBackend::resolve(BackendPreference::BruteForce),
            IndexBackend::BruteForce
        );
        assert_eq!(IndexBackend::resolve(BackendPreference::Auto), IndexBackend::detect());
    }

    #[test]
    fn test_snapshot_rows() {
        let snapshot = IndexSnapshot {
            dimension: 2,
            normalized: false,
            data: vec![1.0, 0.0, 0.0, 1.0, 0.5, 0.5],
        };
        assert_eq!(snapshot.rows(), 3);
    }
}
