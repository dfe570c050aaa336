// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-only search with similarity scores

use anyhow::{Context, Result};
use serde::Serialize;
use std::num::NonZeroUsize;

use docqa::index::RetrievedChunk;
use docqa::output::{colorize_dim, colorize_location, colorize_score, colorize_source, print_json, preview, use_colors};

use super::AppContext;

/// Search result set for JSON output
#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    top_k: usize,
    results: Vec<RetrievedChunk>,
}

/// Run the search command
pub fn run(ctx: &AppContext, query: &str, top_k: Option<NonZeroUsize>) -> Result<()> {
    let top_k = match top_k {
        Some(top_k) => top_k,
        None => ctx.config.retrieval.top_k()?,
    };
    let orchestrator = ctx.orchestrator(false, Some(top_k))?;
    let results = orchestrator
        .retrieve(query, top_k.get())
        .context("Search failed")?;

    if ctx.is_json() {
        return print_json(&SearchOutput {
            query,
            top_k: top_k.get(),
            results,
        });
    }

    let use_color = use_colors();
    if results.is_empty() {
        println!("{}", colorize_dim("No results (index is empty)", use_color));
        return Ok(());
    }

    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{:>2}. {} {} {}",
            rank + 1,
            colorize_score(hit.score, use_color),
            colorize_source(&hit.record.source, use_color),
            colorize_location(hit.record.page, hit.record.chunk_id, use_color)
        );
        println!("    {}", preview(&hit.record.text, 160));
    }
    Ok(())
}
