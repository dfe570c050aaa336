// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers are plain adapters returning `anyhow` errors. [`SharedEmbedder`]
//! sits in front of one provider, serializes access to it, checks what it
//! returns, and reports problems as [`RagError::EncodingFailure`].

use anyhow::{bail, Context};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{RagError, Result};
use crate::index::l2_normalize;

const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;

/// Dimension of sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Configuration for the builtin fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    /// Starts from configured values and applies `FASTEMBED_*` overrides.
    pub fn from_settings(batch_size: usize, max_chars: usize) -> anyhow::Result<Self> {
        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", batch_size)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                batch_size,
                max = MAX_FASTEMBED_BATCH_SIZE,
                "embedding batch size exceeds maximum; clamping"
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", max_chars)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        let normalize = parse_bool_env("FASTEMBED_NORMALIZE", true)?;

        Ok(Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size,
            max_chars,
            normalize,
        })
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts, in input order.
    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Builds the provider selected in configuration.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider() {
        EmbeddingProviderType::Builtin => {
            let settings =
                EmbeddingProviderConfig::from_settings(config.batch_size(), config.max_chars())?;
            Ok(Box::new(FastEmbedder::new(settings)?))
        }
        EmbeddingProviderType::Command => Ok(Box::new(
            CommandProvider::new(config.command().to_string(), config.model().to_string())
                .with_batch_size(config.batch_size()),
        )),
        EmbeddingProviderType::Hash => Ok(Box::new(HashProvider::new(config.dimension()))),
    }
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> anyhow::Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;
        tracing::info!(model = %model_id, "loaded embedding model");

        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and prints a
/// JSON array of vectors (or an object with `embeddings`, `vectors` or `data`).
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if batch_size > 0 {
            self.batch_size = batch_size;
        }
        self
    }

    fn run_command(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload_str = payload.to_string();
            stdin
                .write_all(payload_str.as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_command_output(stdout.trim())
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

fn parse_command_output(stdout: &str) -> anyhow::Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(stdout)
        .with_context(|| "Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<anyhow::Result<Vec<f32>>>()
        })
        .collect()
}

/// Deterministic feature-hashing provider.
///
/// Each lowercase alphanumeric token adds ±1 to a bucket picked by its blake3
/// hash; the result is L2-normalized. Texts sharing words land close together,
/// which is enough for offline use and tests without a model download.
pub struct HashProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashProvider {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hash-{dimension}"),
            dimension,
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// One provider instance shared by every caller, used one call at a time.
pub struct SharedEmbedder {
    provider: Mutex<Box<dyn EmbeddingProvider>>,
    model_id: String,
}

impl SharedEmbedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        let model_id = provider.model_id().to_string();
        Self {
            provider: Mutex::new(provider),
            model_id,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Encodes one text.
    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode_many(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| RagError::EncodingFailure("no embedding returned".to_string()))
    }

    /// Encodes texts in provider-sized batches. Output order matches input order.
    pub fn encode_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut provider = self
            .provider
            .lock()
            .map_err(|_| RagError::EncodingFailure("embedding provider lock poisoned".to_string()))?;
        let batch_size = provider.batch_size().max(1);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let embedded = provider
                .embed_texts(batch)
                .map_err(|err| RagError::EncodingFailure(format!("{err:#}")))?;
            if embedded.len() != batch.len() {
                return Err(RagError::EncodingFailure(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }
        drop(provider);

        validate_vectors(&vectors)?;
        tracing::debug!(count = vectors.len(), model = %self.model_id, "encoded texts");
        Ok(vectors)
    }
}

fn validate_vectors(vectors: &[Vec<f32>]) -> Result<()> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    let dimension = first.len();
    if dimension == 0 {
        return Err(RagError::EncodingFailure("provider returned empty vectors".to_string()));
    }
    for vector in vectors {
        if vector.len() != dimension {
            return Err(RagError::EncodingFailure(format!(
                "provider returned vectors of length {} and {}",
                dimension,
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::EncodingFailure(
                "provider returned non-finite values".to_string(),
            ));
        }
    }
    Ok(())
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

fn parse_usize_env(name: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

fn parse_bool_env(name: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim().to_lowercase();
            if value.is_empty() {
                return Ok(default);
            }
            match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => bail!("Invalid {} value: {}", name, other),
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}
