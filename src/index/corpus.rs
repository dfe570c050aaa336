// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index plus metadata, kept row-aligned.

use std::ops::Range;

use crate::errors::{RagError, Result};
use crate::index::{ChunkRecord, IndexBackend, MetadataStore, ScoredRow, VectorIndex};

/// A row of the corpus matched by a search.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RetrievedChunk {
    pub row: usize,
    pub score: f32,
    #[serde(flatten)]
    pub record: ChunkRecord,
}

/// The set of rows currently queryable.
///
/// Every mutation validates the whole batch before touching either side, so
/// `index.count() == metadata.len()` holds after any call, successful or not.
pub struct Corpus {
    index: Box<dyn VectorIndex>,
    metadata: MetadataStore,
}

impl Corpus {
    /// Empty corpus with no known dimension. Used when nothing was ingested.
    pub fn empty(backend: IndexBackend) -> Self {
        Self::new(backend.create(0))
    }

    pub fn new(index: Box<dyn VectorIndex>) -> Self {
        let metadata = MetadataStore::new();
        Self { index, metadata }
    }

    /// Pairs a loaded index with its metadata, rejecting misaligned halves.
    pub fn from_parts(index: Box<dyn VectorIndex>, metadata: MetadataStore) -> Result<Self> {
        if index.count() != metadata.len() {
            return Err(RagError::corrupt(
                "<corpus>",
                format!(
                    "index has {} rows but metadata has {} records",
                    index.count(),
                    metadata.len()
                ),
            ));
        }
        Ok(Self { index, metadata })
    }

    /// Copies this corpus into a fresh index of `backend`.
    pub fn duplicate(&self, backend: IndexBackend) -> Self {
        Self {
            index: backend.restore(self.index.snapshot()),
            metadata: self.metadata.clone(),
        }
    }

    /// Appends one aligned batch of records and vectors.
    pub fn append(&mut self, records: Vec<ChunkRecord>, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        if records.len() != vectors.len() {
            return Err(RagError::EncodingFailure(format!(
                "{} records but {} vectors",
                records.len(),
                vectors.len()
            )));
        }
        // The index validates dimensions before storing anything.
        let rows = self.index.add(vectors)?;
        self.metadata.append(records);
        debug_assert_eq!(self.index.count(), self.metadata.len());
        Ok(rows)
    }

    /// Ranks rows against `query` and resolves their metadata.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let hits = self.index.search(query, k)?;
        hits.into_iter()
            .map(|ScoredRow { row, score }| {
                let record = self.metadata.get(row)?.clone();
                Ok(RetrievedChunk { row, score, record })
            })
            .collect()
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn backend(&self) -> IndexBackend {
        self.index.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::normalized;

    fn scenario_corpus(backend: IndexBackend) -> Corpus {
        let mut corpus = Corpus::new(backend.create(2));
        corpus
            .append(
                vec![
                    ChunkRecord::new(1, 1, "A", "doc.pdf"),
                    ChunkRecord::new(1, 2, "B", "doc.pdf"),
                    ChunkRecord::new(1, 3, "C", "doc.pdf"),
                ],
                &[vec![1.0, 0.0], vec![0.0, 1.0], normalized(&[0.7, 0.7])],
            )
            .unwrap();
        corpus
    }

    #[test]
    fn test_scenario_returns_a_then_c() {
        for backend in [IndexBackend::detect(), IndexBackend::BruteForce] {
            let corpus = scenario_corpus(backend);
            let hits = corpus.search(&[1.0, 0.0], 2).unwrap();
            let texts: Vec<&str> = hits.iter().map(|h| h.record.text.as_str()).collect();
            assert_eq!(texts, vec!["A", "C"]);
            assert!((hits[0].score - 1.0).abs() < 1e-5);
            assert!((hits[1].score - 0.7071).abs() < 1e-3);
        }
    }

    #[test]
    fn test_alignment_survives_rejected_batches() {
        let mut corpus = scenario_corpus(IndexBackend::detect());

        let mismatched_counts =
            corpus.append(vec![ChunkRecord::new(2, 1, "D", "doc.pdf")], &[]);
        assert!(mismatched_counts.is_err());
        assert_eq!(corpus.index().count(), corpus.metadata().len());

        let wrong_dim = corpus.append(
            vec![
                ChunkRecord::new(2, 1, "D", "doc.pdf"),
                ChunkRecord::new(2, 2, "E", "doc.pdf"),
            ],
            &[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
        );
        assert!(matches!(wrong_dim, Err(RagError::DimensionMismatch { .. })));
        assert_eq!(corpus.index().count(), 3);
        assert_eq!(corpus.metadata().len(), 3);

        let rows = corpus
            .append(vec![ChunkRecord::new(2, 1, "D", "doc.pdf")], &[vec![0.5, 0.5]])
            .unwrap();
        assert_eq!(rows, 3..4);
        assert_eq!(corpus.index().count(), corpus.metadata().len());
    }

    #[test]
    fn test_from_parts_rejects_misaligned() {
        let mut index = IndexBackend::BruteForce.create(2);
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let result = Corpus::from_parts(index, MetadataStore::new());
        assert!(matches!(result, Err(RagError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_empty_corpus_search() {
        let corpus = Corpus::empty(IndexBackend::detect());
        assert!(corpus.is_empty());
        assert!(corpus.search(&[1.0, 2.0, 3.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let corpus = scenario_corpus(IndexBackend::detect());
        let mut copy = corpus.duplicate(IndexBackend::BruteForce);
        copy.append(vec![ChunkRecord::new(9, 1, "Z", "z.txt")], &[vec![1.0, 1.0]])
            .unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(copy.len(), 4);
        assert_eq!(copy.backend(), IndexBackend::BruteForce);
    }
}
