// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document text extraction.
//!
//! Plain-text documents are read directly. PDFs are converted by an external
//! command (`pdftotext` by default) whose stdout separates pages with form
//! feeds.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::ExtractConfig;

/// Extensions the ingest pipeline accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

const PAGE_BREAK: char = '\u{c}';

/// Cleaned text of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Page number (1-indexed).
    pub number: u32,
    pub text: String,
}

/// Whether `path` has an extension we can extract.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Extracts cleaned pages from a document. Pages empty after cleaning are dropped.
pub fn extract_pages(path: &Path, config: &ExtractConfig) -> Result<Vec<Page>> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let raw = if is_pdf {
        run_pdf_command(config.pdf_command(), path)?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };

    let pages = split_pages(&raw);
    tracing::debug!(path = %path.display(), pages = pages.len(), "extracted document");
    Ok(pages)
}

/// Splits raw text on form feeds and cleans each page.
pub fn split_pages(raw: &str) -> Vec<Page> {
    raw.split(PAGE_BREAK)
        .enumerate()
        .filter_map(|(i, page)| {
            let text = clean_text(page);
            (!text.is_empty()).then(|| Page {
                number: (i + 1) as u32,
                text,
            })
        })
        .collect()
}

/// Replaces line breaks with spaces and collapses whitespace runs.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn run_pdf_command(template: &str, path: &Path) -> Result<String> {
    // The path goes in as `$1` so the shell never re-parses it.
    let script = template.replace("{path}", "\"$1\"");

    let output = Command::new("sh")
        .arg("-c")
        .arg(&script)
        .arg("sh")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("Failed to spawn PDF extraction command: {}", template))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "PDF extraction failed for {} (status {}): {}",
            path.display(),
            output.status,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
