// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite cache of chunk embeddings.
//!
//! Embeddings are keyed by model id and the blake3 hash of the chunk text, so
//! re-ingesting a document only encodes chunks the model has not seen.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CACHE_FILE: &str = "embeddings.sqlite";

const SCHEMA_VERSION: &str = "1";

/// SQLite-backed embedding cache.
///
/// Stored at `.docqa/embeddings.sqlite` by default.
pub struct EmbeddingCache {
    conn: Connection,
    path: PathBuf,
}

impl EmbeddingCache {
    /// Opens or creates a cache at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let cache = Self { conn, path };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Opens the cache in an index directory.
    pub fn open_in<P: AsRef<Path>>(index_dir: P) -> Result<Self> {
        Self::open(index_dir.as_ref().join(CACHE_FILE))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunk_embeddings (
                model TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (model, content_hash)
            );
            "#,
            )
            .context("Failed to initialize database schema")?;

        match self.get_meta("schema_version")? {
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) => {
                tracing::warn!(found = %version, "embedding cache schema changed; clearing");
                self.clear()?;
                self.set_meta("schema_version", SCHEMA_VERSION)?;
            }
            None => self.set_meta("schema_version", SCHEMA_VERSION)?,
        }
        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up cached embeddings for `hashes` under `model`.
    ///
    /// Only hits are returned; callers encode whatever is missing.
    pub fn get_many(&self, model: &str, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT dimension, embedding FROM chunk_embeddings WHERE model = ?1 AND content_hash = ?2",
        )?;

        let mut found = HashMap::new();
        for hash in hashes {
            if found.contains_key(hash) {
                continue;
            }
            let row = stmt
                .query_row(params![model, hash], |row| {
                    let dimension: i64 = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((dimension, blob))
                })
                .optional()?;

            if let Some((dimension, blob)) = row {
                let embedding = blob_to_embedding(&blob);
                if embedding.len() as i64 == dimension {
                    found.insert(hash.clone(), embedding);
                } else {
                    tracing::debug!(hash = %hash, "skipping malformed cache entry");
                }
            }
        }
        Ok(found)
    }

    /// Stores embeddings in one transaction, replacing existing entries.
    pub fn put_many(&mut self, model: &str, entries: &[(String, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO chunk_embeddings (model, content_hash, dimension, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(model, content_hash) DO UPDATE SET
                    dimension = excluded.dimension,
                    embedding = excluded.embedding,
                    created_at = excluded.created_at
                "#,
            )?;
            for (hash, embedding) in entries {
                stmt.execute(params![
                    model,
                    hash,
                    embedding.len() as i64,
                    embedding_to_blob(embedding),
                    created_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Counts cached embeddings.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Removes every cached embedding.
    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM chunk_embeddings", [])
            .context("Failed to clear embedding cache")?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to get meta")?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

/// Cache key for a chunk text.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
