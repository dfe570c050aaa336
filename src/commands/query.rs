// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer a question from the indexed documents

use anyhow::{Context, Result};
use std::num::NonZeroUsize;

use docqa::output::{colorize_dim, colorize_location, colorize_score, colorize_source, print_json, preview, use_colors};

use super::AppContext;

/// Run the query command
pub fn run(ctx: &AppContext, question: &str, top_k: Option<NonZeroUsize>, show_sources: bool) -> Result<()> {
    let orchestrator = ctx.orchestrator(true, top_k)?;
    let answer = orchestrator
        .answer(question)
        .context("Failed to answer question")?;

    if ctx.is_json() {
        return print_json(&answer);
    }

    println!("{}", answer.text);
    if show_sources && !answer.sources.is_empty() {
        let use_color = use_colors();
        println!();
        println!("{}", colorize_dim("Sources:", use_color));
        for hit in &answer.sources {
            println!(
                "  {} {} {} {}",
                colorize_score(hit.score, use_color),
                colorize_source(&hit.record.source, use_color),
                colorize_location(hit.record.page, hit.record.chunk_id, use_color),
                colorize_dim(&preview(&hit.record.text, 80), use_color)
            );
        }
    }
    Ok(())
}
