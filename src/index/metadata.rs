// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-row chunk metadata, stored in index row order.

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};

/// Metadata for one indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Page number in the source document (1-indexed)
    pub page: u32,
    /// Chunk number within the page (1-indexed)
    pub chunk_id: u32,
    /// Chunk text handed to the generator as context
    pub text: String,
    /// File name of the originating document
    pub source: String,
}

impl ChunkRecord {
    pub fn new(page: u32, chunk_id: u32, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            page,
            chunk_id,
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Ordered chunk records. Record `i` belongs to index row `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    records: Vec<ChunkRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ChunkRecord>) -> Self {
        Self { records }
    }

    pub fn append(&mut self, records: impl IntoIterator<Item = ChunkRecord>) {
        self.records.extend(records);
    }

    pub fn get(&self, row: usize) -> Result<&ChunkRecord> {
        self.records.get(row).ok_or(RagError::IndexOutOfRange {
            row,
            len: self.records.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.records.iter()
    }

    /// Distinct source documents in first-seen order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.source.as_str()) {
                seen.push(&record.source);
            }
        }
        seen
    }
}
