// SPDX-License-Identifier: MIT OR Apache-2.0

//! docqa - Document question answering library
//!
//! The retrieval core (`index`, `embedding`, `rag`) plus the extraction,
//! ingestion and HTTP layers used by the docqa CLI.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod output;
pub mod rag;
pub mod server;
pub mod utils;
pub mod watch;

pub use errors::{RagError, Result};
