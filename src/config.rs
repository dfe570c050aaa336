// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for docqa
//!
//! Loads configuration from `--config`, .docqarc.toml in current directory or
//! ~/.config/docqa/config.toml

use anyhow::{Context, Result};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::embedding::{ChunkConfig, DEFAULT_EMBEDDING_DIM};
use crate::index::BackendPreference;
use crate::rag::{IngestMode, DEFAULT_TOP_K};

pub const CONFIG_FILE: &str = ".docqarc.toml";

/// Output format for results (mirrored from cli for library use)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOutputFormat {
    #[default]
    Text,
    Json,
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Builtin,
    Command,
    Hash,
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hash)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier reported by the command provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per provider call
    pub batch_size: Option<usize>,
    /// Characters kept per text by the builtin provider
    pub max_chars: Option<usize>,
    /// Vector dimension of the hash provider
    pub dimension: Option<usize>,
    /// Whether the SQLite embedding cache is used
    pub cache: Option<bool>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "local-model-id")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("local-model-id")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get batch size (defaults to 256)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(256)
    }

    /// Get max chars (defaults to 2000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(2000)
    }

    /// Get hash dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }

    /// Get cache flag (defaults to true)
    pub fn cache(&self) -> bool {
        self.cache.unwrap_or(true)
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Words per chunk
    pub max_words: Option<usize>,
    /// Words shared by consecutive chunks
    pub overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Validated chunker settings (defaults 200 / 50)
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        let defaults = ChunkConfig::default();
        ChunkConfig::new(
            self.max_words.unwrap_or(defaults.max_words),
            self.overlap.unwrap_or(defaults.overlap),
        )
        .context("Invalid [chunking] configuration")
    }
}

/// Index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the artifacts
    pub dir: Option<PathBuf>,
    /// Index backend (auto, exact, brute_force)
    pub backend: Option<BackendPreference>,
    /// What an ingest does to the existing corpus (replace, append)
    pub ingest_mode: Option<IngestMode>,
}

impl IndexConfig {
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Get backend preference (defaults to Auto)
    pub fn backend(&self) -> BackendPreference {
        self.backend.unwrap_or_default()
    }

    /// Get ingest mode (defaults to Replace)
    pub fn ingest_mode(&self) -> IngestMode {
        self.ingest_mode.unwrap_or_default()
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks handed to the generator per question
    pub top_k: Option<usize>,
}

impl RetrievalConfig {
    /// Get top k (defaults to 3); zero is rejected
    pub fn top_k(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.top_k.unwrap_or(DEFAULT_TOP_K))
            .context("Invalid [retrieval] configuration: top_k must be at least 1")
    }
}

/// Generation gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible API root
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Environment variable holding the bearer token
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl GenerationConfig {
    /// Get base url (defaults to the Hugging Face router)
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("https://router.huggingface.co/v1")
    }

    /// Get model (defaults to meta-llama/Llama-3.1-8B-Instruct)
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or("meta-llama/Llama-3.1-8B-Instruct")
    }

    /// Get token variable name (defaults to HUGGINGFACEHUB_API_TOKEN)
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or("HUGGINGFACEHUB_API_TOKEN")
    }

    /// Get max tokens (defaults to 512)
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(512)
    }

    /// Get temperature (defaults to 0.5)
    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(0.5)
    }

    /// Get timeout (defaults to 60s)
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(60)
    }

    /// Reads the API token from the configured variable. Empty counts as unset.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.api_key_env())
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Document extraction configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Command converting a PDF to text on stdout; `{path}` is substituted
    pub pdf_command: Option<String>,
}

impl ExtractConfig {
    /// Get pdf command (defaults to pdftotext)
    pub fn pdf_command(&self) -> &str {
        self.pdf_command
            .as_deref()
            .unwrap_or("pdftotext -enc UTF-8 {path} -")
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: Option<String>,
    /// Largest accepted upload body
    pub max_upload_bytes: Option<usize>,
}

impl ServerConfig {
    /// Get bind address (defaults to 127.0.0.1:8000)
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or("127.0.0.1:8000")
    }

    /// Get max upload bytes (defaults to 50MB)
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes.unwrap_or(50 * 1024 * 1024)
    }
}

/// Configuration loaded from .docqarc.toml or ~/.config/docqa/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. `explicit` (an error if it cannot be read or parsed)
    /// 2. .docqarc.toml in current directory
    /// 3. ~/.config/docqa/config.toml
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::load_from_path(Path::new(CONFIG_FILE))
                .or_else(|| {
                    let home = dirs::home_dir()?;
                    Self::load_from_path(&home.join(".config").join("docqa").join("config.toml"))
                })
                .unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make every later operation fail.
    pub fn validate(&self) -> Result<()> {
        self.chunking.chunk_config()?;
        self.retrieval.top_k()?;
        Ok(())
    }

    /// Reads and parses one config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get output format from config, parsing the string to ConfigOutputFormat
    pub fn output_format(&self) -> Option<ConfigOutputFormat> {
        self.default_format
            .as_ref()
            .and_then(|s| match s.to_lowercase().as_str() {
                "json" => Some(ConfigOutputFormat::Json),
                "text" => Some(ConfigOutputFormat::Text),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Builtin);
        assert!(config.embeddings.cache());
        assert_eq!(config.retrieval.top_k().unwrap().get(), 3);
        assert_eq!(config.generation.max_tokens(), 512);
        assert!((config.generation.temperature() - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.generation.timeout_secs(), 60);
        assert_eq!(config.index.ingest_mode(), IngestMode::Replace);
        assert_eq!(config.index.backend(), BackendPreference::Auto);
        assert_eq!(config.server.bind(), "127.0.0.1:8000");
        assert_eq!(config.chunking.chunk_config().unwrap(), ChunkConfig::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
            default_format = "json"

            [embeddings]
            provider = "hash"
            dimension = 64
            cache = false

            [chunking]
            max_words = 100
            overlap = 10

            [index]
            dir = "/tmp/idx"
            backend = "brute_force"
            ingest_mode = "append"

            [retrieval]
            top_k = 5

            [generation]
            base_url = "http://localhost:9000/v1"
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.output_format(), Some(ConfigOutputFormat::Json));
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Hash);
        assert_eq!(config.embeddings.dimension(), 64);
        assert!(!config.embeddings.cache());
        assert_eq!(config.chunking.chunk_config().unwrap().max_words, 100);
        assert_eq!(config.index.dir(), Some(Path::new("/tmp/idx")));
        assert_eq!(config.index.backend(), BackendPreference::BruteForce);
        assert_eq!(config.index.ingest_mode(), IngestMode::Append);
        assert_eq!(config.retrieval.top_k().unwrap().get(), 5);
        assert_eq!(config.generation.base_url(), "http://localhost:9000/v1");
        assert_eq!(config.generation.timeout_secs(), 5);
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let config: Config = toml::from_str("[chunking]\nmax_words = 10\noverlap = 10\n").unwrap();
        assert!(config.chunking.chunk_config().is_err());
    }

    #[test]
    fn test_zero_top_k_rejected_on_load() {
        let config: Config = toml::from_str("[retrieval]\ntop_k = 0\n").unwrap();
        assert!(config.retrieval.top_k().is_err());

        let dir = tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[retrieval]\ntop_k = 0\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("top_k must be at least 1"));
    }

    #[test]
    fn test_explicit_file_errors_propagate() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[index\n").unwrap();
        assert!(Config::load(Some(&broken)).is_err());

        let good = dir.path().join("good.toml");
        std::fs::write(&good, "[retrieval]\ntop_k = 7\n").unwrap();
        assert_eq!(Config::load(Some(&good)).unwrap().retrieval.top_k().unwrap().get(), 7);
    }
}
