// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error kinds for the retrieval core.
//!
//! Everything under `index`, `embedding` and `rag` returns [`RagError`] so callers
//! can branch on the kind instead of parsing messages. Glue code (CLI, server,
//! extraction) wraps these in `anyhow` at the edges.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Row {row} out of range (store has {len} rows)")]
    IndexOutOfRange { row: usize, len: usize },

    #[error("Artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Corrupt artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Generation timed out after {}s", .0.as_secs())]
    GenerationTimeout(Duration),

    #[error("top_k must be greater than 0")]
    InvalidTopK,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EncodingFailure(_) => "encoding_failure",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::NotFound(_) => "not_found",
            Self::CorruptArtifact { .. } => "corrupt_artifact",
            Self::GenerationFailure(_) => "generation_failure",
            Self::GenerationTimeout(_) => "generation_timeout",
            Self::InvalidTopK => "invalid_top_k",
            Self::Io(_) => "io",
        }
    }

    /// True for data-integrity errors that must never be swallowed.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::IndexOutOfRange { .. } | Self::CorruptArtifact { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(RagError::InvalidTopK.kind(), "invalid_top_k");
        assert_eq!(
            RagError::GenerationTimeout(Duration::from_secs(3)).kind(),
            "generation_timeout"
        );
    }

    #[test]
    fn test_structural_classification() {
        assert!(RagError::DimensionMismatch { expected: 3, actual: 2 }.is_structural());
        assert!(RagError::corrupt("index.bin", "bad magic").is_structural());
        assert!(!RagError::NotFound(PathBuf::from("index.bin")).is_structural());
        assert!(!RagError::GenerationFailure("quota".into()).is_structural());
    }

    #[test]
    fn test_display_messages() {
        let err = RagError::IndexOutOfRange { row: 7, len: 3 };
        assert_eq!(err.to_string(), "Row 7 out of range (store has 3 rows)");

        let err = RagError::GenerationTimeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "Generation timed out after 60s");
    }
}
