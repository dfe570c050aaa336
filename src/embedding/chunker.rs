// SPDX-License-Identifier: MIT OR Apache-2.0

//! Word-window chunker.
//!
//! Page text is split on whitespace and cut into windows of `max_words` words.
//! Consecutive windows share `overlap` words, so a sentence that straddles a
//! boundary still shows up whole in one chunk.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::extract::Page;

/// Default number of words per chunk.
pub const DEFAULT_MAX_WORDS: usize = 200;

/// Default overlap between consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 50;

/// Configuration for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Number of words per chunk.
    pub max_words: usize,
    /// Number of words shared by consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(max_words: usize, overlap: usize) -> Result<Self> {
        if max_words == 0 {
            bail!("max_words must be greater than 0");
        }
        if overlap >= max_words {
            bail!("overlap ({}) must be less than max_words ({})", overlap, max_words);
        }
        Ok(Self { max_words, overlap })
    }

    fn step(&self) -> usize {
        self.max_words.saturating_sub(self.overlap).max(1)
    }
}

/// A chunk of page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Page number (1-indexed).
    pub page: u32,
    /// Chunk number within the page (1-indexed).
    pub chunk_id: u32,
    pub text: String,
}

/// Splits `text` into overlapping word windows.
///
/// ```text
/// step = max_words - overlap
/// for start in (0..words).step_by(step):
///   emit words[start..min(start + max_words, words)]
/// ```
pub fn chunk_words(text: &str, config: &ChunkConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    (0..words.len())
        .step_by(config.step())
        .map(|start| {
            let end = (start + config.max_words).min(words.len());
            words[start..end].join(" ")
        })
        .collect()
}

/// Chunks every page, numbering chunks from 1 within each page.
pub fn chunk_pages(pages: &[Page], config: &ChunkConfig) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| {
            chunk_words(&page.text, config)
                .into_iter()
                .enumerate()
                .map(move |(i, text)| Chunk {
                    page: page.number,
                    chunk_id: (i + 1) as u32,
                    text,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_default_config() {
        let config = ChunkConfig::default();
        assert_eq!(config.max_words, 200);
        assert_eq!(config.overlap, 50);
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(200, 50).is_ok());
        assert!(ChunkConfig::new(20, 20).is_err());
        assert!(ChunkConfig::new(20, 30).is_err());
        assert!(ChunkConfig::new(0, 0).is_err());
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_words("", &ChunkConfig::default()).is_empty());
        assert!(chunk_words("   \t ", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_words("hello   world", &ChunkConfig::default());
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_450_words_windows() {
        let text = numbered_words(450);
        let chunks = chunk_words(&text, &ChunkConfig::default());

        assert_eq!(chunks.len(), 3);
        let firsts: Vec<&str> = chunks
            .iter()
            .map(|c| c.split(' ').next().unwrap())
            .collect();
        assert_eq!(firsts, vec!["w0", "w150", "w300"]);

        for chunk in &chunks {
            assert!(chunk.split(' ').count() <= 200);
        }

        for pair in chunks.windows(2) {
            let left: Vec<&str> = pair[0].split(' ').collect();
            let right: Vec<&str> = pair[1].split(' ').collect();
            assert_eq!(&left[left.len() - 50..], &right[..50]);
        }
    }

    #[test]
    fn test_tail_window_inside_previous_chunk() {
        // 11 words, step 9: the window at 9 only repeats words 9 and 10.
        let text = numbered_words(11);
        let chunks = chunk_words(&text, &ChunkConfig::new(12, 3).unwrap());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], text);
        assert_eq!(chunks[1], "w9 w10");
    }

    #[test]
    fn test_chunk_pages_numbers_per_page() {
        let config = ChunkConfig::new(4, 1).unwrap();
        let pages = vec![
            Page {
                number: 1,
                text: numbered_words(7),
            },
            Page {
                number: 3,
                text: "tiny page".to_string(),
            },
        ];

        let chunks = chunk_pages(&pages, &config);
        let ids: Vec<(u32, u32)> = chunks.iter().map(|c| (c.page, c.chunk_id)).collect();
        // 7 words, step 3: starts at 0, 3, 6
        assert_eq!(ids, vec![(1, 1), (1, 2), (1, 3), (3, 1)]);
        assert_eq!(chunks[1].text, "w3 w4 w5 w6");
        assert_eq!(chunks[3].text, "tiny page");
    }
}
