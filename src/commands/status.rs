// SPDX-License-Identifier: MIT OR Apache-2.0

//! Show index status

use anyhow::Result;

use docqa::output::{colorize_dim, colorize_heading, print_json, use_colors};
use docqa::rag::CorpusState;

use super::AppContext;

/// Run the status command
pub fn run(ctx: &AppContext) -> Result<()> {
    let orchestrator = ctx.orchestrator(false, None)?;
    let status = orchestrator.status();

    if ctx.is_json() {
        return print_json(&status);
    }

    let use_color = use_colors();
    let state = match status.state {
        CorpusState::Ready if status.rows == 0 => "empty",
        CorpusState::Ready => "ready",
        CorpusState::Uninitialized => "uninitialized",
    };
    println!("{} {}", colorize_heading("Index:", use_color), ctx.index_dir.display());
    println!("  state:     {}", state);
    println!("  rows:      {}", status.rows);
    println!("  dimension: {}", status.dimension);
    println!("  backend:   {}", status.backend);
    println!("  model:     {}", status.model);
    if status.documents.is_empty() {
        println!("  {}", colorize_dim("no documents ingested", use_color));
    } else {
        println!("  documents:");
        for doc in &status.documents {
            println!("    {}", doc);
        }
    }
    Ok(())
}
