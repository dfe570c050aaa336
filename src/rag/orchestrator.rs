// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-time retrieval and answer generation over the active corpus.
//!
//! The active corpus sits behind an [`ArcSwap`]. Readers take one snapshot and
//! finish against it; reload and commit build a replacement off to the side and
//! publish it with a single store.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::embedding::SharedEmbedder;
use crate::errors::{RagError, Result};
use crate::index::{persist, ArtifactPaths, ChunkRecord, Corpus, IndexBackend, RetrievedChunk};
use crate::rag::generation::{ChatMessage, GenerationGateway};

pub const DEFAULT_TOP_K: usize = 3;

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the question based on the context provided below.";

pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the uploaded document.";

pub const GATEWAY_UNAVAILABLE_ANSWER: &str =
    "Error: generation gateway not configured. Check API token.";

/// What an ingest does to the rows already in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// The new batch becomes the whole corpus.
    #[default]
    Replace,
    /// The new batch is added after the existing rows.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusState {
    /// No load has succeeded yet.
    Uninitialized,
    /// A corpus (possibly empty) is loaded.
    Ready,
}

struct ActiveCorpus {
    state: CorpusState,
    corpus: Corpus,
}

/// How an answer was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Generated,
    NoContext,
    GatewayUnavailable,
    /// The gateway call failed; holds the error kind.
    GatewayFailed(String),
}

/// Answer text plus how it came about and which chunks fed it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    pub sources: Vec<RetrievedChunk>,
}

/// Result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub added: usize,
    pub total: usize,
}

/// Snapshot of the orchestrator for `status` endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStatus {
    pub state: CorpusState,
    pub rows: usize,
    pub dimension: usize,
    pub backend: IndexBackend,
    pub documents: Vec<String>,
    pub model: String,
    pub generation_available: bool,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Owns the active corpus and answers questions against it.
pub struct RetrievalOrchestrator {
    active: ArcSwap<ActiveCorpus>,
    paths: ArtifactPaths,
    backend: IndexBackend,
    embedder: Arc<SharedEmbedder>,
    gateway: Option<Box<dyn GenerationGateway>>,
    top_k: usize,
    commit_lock: Mutex<()>,
}

impl RetrievalOrchestrator {
    /// Creates an orchestrator in the `Uninitialized` state. Call [`reload`]
    /// to pick up existing artifacts.
    ///
    /// [`reload`]: RetrievalOrchestrator::reload
    pub fn new(paths: ArtifactPaths, backend: IndexBackend, embedder: Arc<SharedEmbedder>) -> Self {
        Self {
            active: ArcSwap::from_pointee(ActiveCorpus {
                state: CorpusState::Uninitialized,
                corpus: Corpus::empty(backend),
            }),
            paths,
            backend,
            embedder,
            gateway: None,
            top_k: DEFAULT_TOP_K,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn with_gateway(mut self, gateway: Box<dyn GenerationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_top_k(mut self, top_k: NonZeroUsize) -> Self {
        self.top_k = top_k.get();
        self
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn embedder(&self) -> &Arc<SharedEmbedder> {
        &self.embedder
    }

    pub fn state(&self) -> CorpusState {
        self.active.load().state
    }

    /// Number of rows in the active corpus.
    pub fn len(&self) -> usize {
        self.active.load().corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads the artifacts from disk and makes them active.
    ///
    /// Missing artifacts install an empty corpus. Corrupt artifacts return an
    /// error and leave the previous corpus active. Returns the row count.
    pub fn reload(&self) -> Result<usize> {
        let _guard = self.lock_commits();
        self.reload_locked()
    }

    fn reload_locked(&self) -> Result<usize> {
        let corpus = match persist::load(&self.paths, self.backend) {
            Ok((index, metadata)) => Corpus::from_parts(index, metadata)?,
            Err(RagError::NotFound(path)) => {
                tracing::info!(missing = %path.display(), "no index found; starting with an empty corpus");
                Corpus::empty(self.backend)
            }
            Err(err) => {
                tracing::warn!(error = %err, "reload failed; keeping the previous corpus");
                return Err(err);
            }
        };

        let rows = corpus.len();
        self.active.store(Arc::new(ActiveCorpus {
            state: CorpusState::Ready,
            corpus,
        }));
        tracing::info!(rows, backend = %self.backend, "corpus loaded");
        Ok(rows)
    }

    /// Ranked chunks for `query`, with scores and records.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(RagError::InvalidTopK);
        }

        let active = self.active.load_full();
        if active.corpus.is_empty() {
            tracing::debug!("corpus is empty; skipping retrieval");
            return Ok(Vec::new());
        }

        let vector = self.embedder.encode(query)?;
        let hits = active.corpus.search(&vector, top_k)?;
        tracing::debug!(top_k, hits = hits.len(), "retrieved context");
        Ok(hits)
    }

    /// Texts of the best `top_k` chunks, best first.
    pub fn retrieve_context(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve(query, top_k)?
            .into_iter()
            .map(|hit| hit.record.text)
            .collect())
    }

    /// Answers `query` from the corpus.
    ///
    /// Gateway failures do not fail the call: they come back as answer text
    /// with [`AnswerOutcome::GatewayFailed`].
    pub fn answer(&self, query: &str) -> Result<Answer> {
        let sources = self.retrieve(query, self.top_k)?;
        if sources.is_empty() {
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                outcome: AnswerOutcome::NoContext,
                sources,
            });
        }

        let Some(gateway) = self.gateway.as_deref() else {
            return Ok(Answer {
                text: GATEWAY_UNAVAILABLE_ANSWER.to_string(),
                outcome: AnswerOutcome::GatewayUnavailable,
                sources,
            });
        };

        let context = sources
            .iter()
            .map(|hit| hit.record.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages = build_messages(&context, query);

        match gateway.complete(&messages) {
            Ok(reply) => Ok(Answer {
                text: reply.trim().to_string(),
                outcome: AnswerOutcome::Generated,
                sources,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "generation failed");
                Ok(Answer {
                    text: format!("Error generating answer: {err}"),
                    outcome: AnswerOutcome::GatewayFailed(err.kind().to_string()),
                    sources,
                })
            }
        }
    }

    /// Answer text only.
    pub fn answer_query(&self, query: &str) -> Result<String> {
        self.answer(query).map(|answer| answer.text)
    }

    /// Adds a batch of records and vectors, persists the result, and reloads it.
    ///
    /// Commits are serialized. The active corpus is never mutated; the new one
    /// is built from a copy (append) or from scratch (replace).
    pub fn commit(
        &self,
        records: Vec<ChunkRecord>,
        vectors: Vec<Vec<f32>>,
        mode: IngestMode,
    ) -> Result<CommitReport> {
        let _guard = self.lock_commits();
        let mut active = self.active.load_full();
        if mode == IngestMode::Append && active.state == CorpusState::Uninitialized {
            // Appending must build on what is on disk, not the placeholder.
            self.reload_locked()?;
            active = self.active.load_full();
        }

        let mut corpus = match mode {
            IngestMode::Append if !active.corpus.is_empty() => active.corpus.duplicate(self.backend),
            _ => {
                let dimension = vectors
                    .first()
                    .map(Vec::len)
                    .unwrap_or_else(|| active.corpus.dimension());
                Corpus::new(self.backend.create(dimension))
            }
        };
        drop(active);

        let added = corpus.append(records, &vectors)?.len();
        persist::save(corpus.index(), corpus.metadata(), &self.paths)?;
        let total = self.reload_locked()?;

        tracing::info!(added, total, ?mode, "committed batch");
        Ok(CommitReport { added, total })
    }

    pub fn status(&self) -> CorpusStatus {
        let active = self.active.load();
        CorpusStatus {
            state: active.state,
            rows: active.corpus.len(),
            dimension: active.corpus.dimension(),
            backend: active.corpus.backend(),
            documents: active
                .corpus
                .metadata()
                .sources()
                .into_iter()
                .map(str::to_string)
                .collect(),
            model: self.embedder.model_id().to_string(),
            generation_available: self.gateway.is_some(),
            index_path: self.paths.index.clone(),
            metadata_path: self.paths.metadata.clone(),
        }
    }

    fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The two-message conversation sent to the gateway.
pub fn build_messages(context: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context:\n{context}\n\nQuestion:\n{query}")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashProvider};
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Maps known texts to fixed vectors.
    struct TableProvider(HashMap<String, Vec<f32>>);

    impl EmbeddingProvider for TableProvider {
        fn model_id(&self) -> &str {
            "table"
        }

        fn batch_size(&self) -> usize {
            16
        }

        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    self.0
                        .get(t)
                        .cloned()
                        .ok_or_else(|| anyhow::anyhow!("unknown text {t}"))
                })
                .collect()
        }
    }

    struct EchoGateway;

    impl GenerationGateway for EchoGateway {
        fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            Ok(format!("  {}  ", messages[1].content))
        }
    }

    fn table_embedder() -> Arc<SharedEmbedder> {
        let table = HashMap::from([
            ("east".to_string(), vec![1.0, 0.0]),
            ("north".to_string(), vec![0.0, 1.0]),
        ]);
        Arc::new(SharedEmbedder::new(Box::new(TableProvider(table))))
    }

    fn scenario_batch() -> (Vec<ChunkRecord>, Vec<Vec<f32>>) {
        (
            vec![
                ChunkRecord::new(1, 1, "A", "doc.pdf"),
                ChunkRecord::new(1, 2, "B", "doc.pdf"),
                ChunkRecord::new(1, 3, "C", "doc.pdf"),
            ],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
    }

    #[test]
    fn test_reload_without_artifacts_is_ready_and_empty() {
        let dir = tempdir().unwrap();
        let orchestrator = RetrievalOrchestrator::new(
            ArtifactPaths::in_dir(dir.path()),
            IndexBackend::detect(),
            table_embedder(),
        );
        assert_eq!(orchestrator.state(), CorpusState::Uninitialized);

        assert_eq!(orchestrator.reload().unwrap(), 0);
        assert_eq!(orchestrator.state(), CorpusState::Ready);
        // The table provider would fail on this text; an empty corpus never encodes.
        assert!(orchestrator.retrieve_context("unknown", 3).unwrap().is_empty());
        assert_eq!(orchestrator.answer_query("unknown").unwrap(), NO_CONTEXT_ANSWER);
    }

    #[test]
    fn test_commit_then_retrieve_scenario() {
        let dir = tempdir().unwrap();
        let orchestrator = RetrievalOrchestrator::new(
            ArtifactPaths::in_dir(dir.path()),
            IndexBackend::detect(),
            table_embedder(),
        );
        let (records, vectors) = scenario_batch();
        let report = orchestrator
            .commit(records, vectors, IngestMode::Replace)
            .unwrap();
        assert_eq!(report, CommitReport { added: 3, total: 3 });

        assert_eq!(
            orchestrator.retrieve_context("east", 2).unwrap(),
            vec!["A".to_string(), "C".to_string()]
        );
        assert!(matches!(
            orchestrator.retrieve("east", 0),
            Err(RagError::InvalidTopK)
        ));
    }

    #[test]
    fn test_append_and_replace_modes() {
        let dir = tempdir().unwrap();
        let orchestrator = RetrievalOrchestrator::new(
            ArtifactPaths::in_dir(dir.path()),
            IndexBackend::detect(),
            table_embedder(),
        );
        let (records, vectors) = scenario_batch();
        orchestrator.commit(records, vectors, IngestMode::Append).unwrap();

        let report = orchestrator
            .commit(
                vec![ChunkRecord::new(1, 1, "D", "other.txt")],
                vec![vec![0.0, 1.0]],
                IngestMode::Append,
            )
            .unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(orchestrator.status().documents, vec!["doc.pdf", "other.txt"]);

        let report = orchestrator
            .commit(
                vec![ChunkRecord::new(1, 1, "E", "fresh.txt")],
                vec![vec![1.0, 0.0]],
                IngestMode::Replace,
            )
            .unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(orchestrator.retrieve_context("north", 5).unwrap(), vec!["E"]);
    }

    #[test]
    fn test_failed_commit_keeps_active_corpus() {
        let dir = tempdir().unwrap();
        let orchestrator = RetrievalOrchestrator::new(
            ArtifactPaths::in_dir(dir.path()),
            IndexBackend::detect(),
            table_embedder(),
        );
        let (records, vectors) = scenario_batch();
        orchestrator.commit(records, vectors, IngestMode::Replace).unwrap();

        let result = orchestrator.commit(
            vec![ChunkRecord::new(2, 1, "bad", "doc.pdf")],
            vec![vec![1.0, 0.0, 0.0]],
            IngestMode::Append,
        );
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
        assert_eq!(orchestrator.len(), 3);
    }

    #[test]
    fn test_answer_outcomes() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let writer =
            RetrievalOrchestrator::new(paths.clone(), IndexBackend::detect(), table_embedder());
        let (records, vectors) = scenario_batch();
        writer.commit(records, vectors, IngestMode::Replace).unwrap();

        let without_gateway =
            RetrievalOrchestrator::new(paths.clone(), IndexBackend::detect(), table_embedder());
        without_gateway.reload().unwrap();
        let answer = without_gateway.answer("east").unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::GatewayUnavailable);
        assert_eq!(answer.text, GATEWAY_UNAVAILABLE_ANSWER);
        assert_eq!(answer.sources.len(), 3);

        let with_gateway = RetrievalOrchestrator::new(paths, IndexBackend::detect(), table_embedder())
            .with_gateway(Box::new(EchoGateway))
            .with_top_k(NonZeroUsize::new(2).unwrap());
        with_gateway.reload().unwrap();
        let answer = with_gateway.answer("east").unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Generated);
        assert_eq!(answer.text, "Context:\nA\n\nC\n\nQuestion:\neast");
    }

    #[test]
    fn test_corrupt_reload_keeps_previous_corpus() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let orchestrator = RetrievalOrchestrator::new(
            paths.clone(),
            IndexBackend::BruteForce,
            Arc::new(SharedEmbedder::new(Box::new(HashProvider::new(16)))),
        );
        orchestrator
            .commit(
                vec![ChunkRecord::new(1, 1, "kept", "a.txt")],
                vec![vec![1.0; 16]],
                IngestMode::Replace,
            )
            .unwrap();

        std::fs::write(&paths.metadata, b"garbage").unwrap();
        let err = orchestrator.reload().unwrap_err();
        assert!(matches!(err, RagError::CorruptArtifact { .. }));
        assert_eq!(orchestrator.len(), 1);
        assert_eq!(orchestrator.state(), CorpusState::Ready);
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages("ctx", "why?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].content, "Context:\nctx\n\nQuestion:\nwhy?");
    }
}
