// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations and the wiring they share

pub mod ingest;
pub mod query;
pub mod search;
pub mod serve;
pub mod status;

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use docqa::config::{Config, ConfigOutputFormat};
use docqa::embedding::{create_provider, EmbeddingCache, SharedEmbedder};
use docqa::index::{ArtifactPaths, IndexBackend};
use docqa::ingest::IngestPipeline;
use docqa::rag::{OpenAiCompatibleGateway, RetrievalOrchestrator};
use docqa::utils::resolve_index_dir;

use crate::cli::{Cli, OutputFormat};

/// Settings resolved from flags and config, shared by every command.
pub struct AppContext {
    pub config: Config,
    pub index_dir: PathBuf,
    pub format: OutputFormat,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        let cwd = std::env::current_dir().context("Cannot determine current directory")?;
        let index_dir = resolve_index_dir(cli.index_dir.as_deref(), config.index.dir(), &cwd);

        let format = cli.format.unwrap_or(match config.output_format() {
            Some(ConfigOutputFormat::Json) => OutputFormat::Json,
            _ => OutputFormat::Text,
        });

        tracing::debug!(index_dir = %index_dir.display(), "resolved index directory");
        Ok(Self {
            config,
            index_dir,
            format,
        })
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Builds the orchestrator and loads the current artifacts.
    ///
    /// The gateway is only built when `generation` is set, so retrieval-only
    /// commands never need an API token. `top_k` overrides `[retrieval] top_k`.
    pub fn orchestrator(&self, generation: bool, top_k: Option<NonZeroUsize>) -> Result<Arc<RetrievalOrchestrator>> {
        let top_k = match top_k {
            Some(top_k) => top_k,
            None => self.config.retrieval.top_k()?,
        };
        let provider = create_provider(&self.config.embeddings)?;
        let embedder = Arc::new(SharedEmbedder::new(provider));
        let backend = IndexBackend::resolve(self.config.index.backend());

        let mut orchestrator =
            RetrievalOrchestrator::new(ArtifactPaths::in_dir(&self.index_dir), backend, embedder)
                .with_top_k(top_k);
        if generation {
            if let Some(gateway) = OpenAiCompatibleGateway::from_config(&self.config.generation)? {
                orchestrator = orchestrator.with_gateway(Box::new(gateway));
            }
        }

        orchestrator
            .reload()
            .with_context(|| format!("Failed to load index from {}", self.index_dir.display()))?;
        Ok(Arc::new(orchestrator))
    }

    /// Builds the ingest pipeline around `orchestrator`.
    pub fn pipeline(&self, orchestrator: Arc<RetrievalOrchestrator>, use_cache: bool) -> Result<IngestPipeline> {
        let chunking = self.config.chunking.chunk_config()?;
        let progress = !self.is_json() && std::io::stderr().is_terminal();
        let mut pipeline = IngestPipeline::new(orchestrator, chunking, self.config.extract.clone())
            .with_progress(progress);

        if use_cache && self.config.embeddings.cache() {
            match EmbeddingCache::open_in(&self.index_dir) {
                Ok(cache) => pipeline = pipeline.with_cache(cache),
                Err(err) => tracing::warn!(error = %format!("{err:#}"), "embedding cache unavailable"),
            }
        }
        Ok(pipeline)
    }
}
