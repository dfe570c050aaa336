// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns chunk text into vectors
//!
//! Providers, the word-window chunker that feeds them, and the SQLite cache
//! that lets re-ingestion skip chunks already encoded.

pub mod cache;
pub mod chunker;
pub mod provider;

pub use cache::{content_hash, EmbeddingCache};
pub use chunker::{chunk_pages, chunk_words, Chunk, ChunkConfig};
pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder,
    HashProvider, SharedEmbedder, DEFAULT_EMBEDDING_DIM,
};
