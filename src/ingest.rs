// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document ingestion: extract, chunk, embed, commit.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use walkdir::WalkDir;

use crate::config::ExtractConfig;
use crate::embedding::{chunk_pages, content_hash, ChunkConfig, EmbeddingCache};
use crate::extract::{extract_pages, is_supported};
use crate::index::ChunkRecord;
use crate::rag::{IngestMode, RetrievalOrchestrator};

/// Texts per encode call, so the progress bar moves during long ingests.
const ENCODE_STEP: usize = 64;

/// Raised when the documents produced no chunks at all.
#[derive(Debug, thiserror::Error)]
#[error("No text extracted from {0}")]
pub struct NoTextExtracted(pub String);

/// Outcome of one ingest run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub cache_hits: usize,
    /// Rows in the corpus after the commit.
    pub total_rows: usize,
    pub mode: IngestMode,
    pub sources: Vec<String>,
}

pub struct IngestPipeline {
    orchestrator: Arc<RetrievalOrchestrator>,
    chunking: ChunkConfig,
    extract: ExtractConfig,
    cache: Option<Mutex<EmbeddingCache>>,
    progress: bool,
}

impl IngestPipeline {
    pub fn new(orchestrator: Arc<RetrievalOrchestrator>, chunking: ChunkConfig, extract: ExtractConfig) -> Self {
        Self {
            orchestrator,
            chunking,
            extract,
            cache: None,
            progress: false,
        }
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// Shows a progress bar while encoding.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn orchestrator(&self) -> &Arc<RetrievalOrchestrator> {
        &self.orchestrator
    }

    /// Ingests files and directories. Directories are walked for supported documents.
    pub fn ingest_files(&self, paths: &[PathBuf], mode: IngestMode) -> Result<IngestReport> {
        let documents = collect_documents(paths)?;
        let named = documents
            .into_iter()
            .map(|path| {
                let name = source_name(&path);
                (path, name)
            })
            .collect::<Vec<_>>();
        self.ingest_named(&named, mode)
    }

    /// Ingests one document whose display name differs from its path (uploads).
    pub fn ingest_document(&self, path: &Path, name: &str, mode: IngestMode) -> Result<IngestReport> {
        self.ingest_named(&[(path.to_path_buf(), name.to_string())], mode)
    }

    fn ingest_named(&self, documents: &[(PathBuf, String)], mode: IngestMode) -> Result<IngestReport> {
        let mut records = Vec::new();
        for (path, name) in documents {
            let pages = extract_pages(path, &self.extract)
                .with_context(|| format!("Failed to extract {}", path.display()))?;
            let chunks = chunk_pages(&pages, &self.chunking);
            tracing::info!(document = %name, pages = pages.len(), chunks = chunks.len(), "chunked document");
            records.extend(
                chunks
                    .into_iter()
                    .map(|chunk| ChunkRecord::new(chunk.page, chunk.chunk_id, chunk.text, name.as_str())),
            );
        }

        if records.is_empty() {
            let names = documents
                .iter()
                .map(|(_, name)| name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(NoTextExtracted(names).into());
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let (vectors, cache_hits) = self.embed(&texts)?;
        let chunks = records.len();

        let commit = self
            .orchestrator
            .commit(records, vectors, mode)
            .context("Failed to commit ingested chunks")?;

        Ok(IngestReport {
            documents: documents.len(),
            chunks,
            cache_hits,
            total_rows: commit.total,
            mode,
            sources: documents.iter().map(|(_, name)| name.clone()).collect(),
        })
    }

    /// Encodes `texts`, reusing cached vectors. Returns vectors in input order
    /// and the number of cache hits.
    fn embed(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, usize)> {
        let embedder = self.orchestrator.embedder();
        let model = embedder.model_id().to_string();
        let hashes: Vec<String> = texts.iter().map(|text| content_hash(text)).collect();

        let mut known: HashMap<String, Vec<f32>> = match &self.cache {
            Some(cache) => {
                let cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
                cache.get_many(&model, &hashes).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "embedding cache lookup failed");
                    HashMap::new()
                })
            }
            None => HashMap::new(),
        };
        let cache_hits = hashes.iter().filter(|h| known.contains_key(*h)).count();

        let mut queued = HashSet::new();
        let missing: Vec<usize> = hashes
            .iter()
            .enumerate()
            .filter(|(_, hash)| !known.contains_key(*hash) && queued.insert(hash.as_str()))
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let pb = self.progress_bar(missing.len());
            let mut fresh = Vec::with_capacity(missing.len());
            for step in missing.chunks(ENCODE_STEP) {
                let batch: Vec<String> = step.iter().map(|&i| texts[i].clone()).collect();
                let vectors = embedder.encode_many(&batch).context("Failed to embed chunks")?;
                for (&i, vector) in step.iter().zip(vectors) {
                    fresh.push((hashes[i].clone(), vector));
                }
                pb.inc(step.len() as u64);
            }
            pb.finish_and_clear();

            if let Some(cache) = &self.cache {
                let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(err) = cache.put_many(&model, &fresh) {
                    tracing::warn!(error = %err, "failed to update embedding cache");
                }
            }
            known.extend(fresh);
        }

        tracing::debug!(chunks = texts.len(), cache_hits, encoded = missing.len(), "embedded chunks");
        let vectors = hashes
            .iter()
            .map(|hash| {
                known
                    .get(hash)
                    .cloned()
                    .with_context(|| format!("missing embedding for chunk {hash}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((vectors, cache_hits))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len} chunks | Embedding") {
            pb.set_style(style.progress_chars("##."));
        }
        pb
    }
}

/// Expands directories into the supported documents beneath them, sorted by path.
pub fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
                if entry.file_type().is_file() && is_supported(entry.path()) {
                    documents.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            documents.push(path.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }
    documents.sort();
    documents.dedup();
    Ok(documents)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
