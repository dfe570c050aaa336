// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingest documents into the index

use anyhow::Result;
use std::path::PathBuf;

use docqa::output::{colorize_dim, colorize_heading, print_json, use_colors};
use docqa::rag::IngestMode;

use super::AppContext;

/// Run the ingest command
pub fn run(ctx: &AppContext, paths: &[PathBuf], append: bool, replace: bool, no_cache: bool) -> Result<()> {
    let mode = if append {
        IngestMode::Append
    } else if replace {
        IngestMode::Replace
    } else {
        ctx.config.index.ingest_mode()
    };

    let orchestrator = ctx.orchestrator(false, None)?;
    let pipeline = ctx.pipeline(orchestrator, !no_cache)?;
    let report = pipeline.ingest_files(paths, mode)?;

    if ctx.is_json() {
        return print_json(&report);
    }

    let use_color = use_colors();
    println!(
        "{} {} document(s), {} chunk(s)",
        colorize_heading("Indexed", use_color),
        report.documents,
        report.chunks
    );
    println!(
        "{}",
        colorize_dim(
            &format!(
                "  mode: {:?}, cache hits: {}, rows in corpus: {}",
                report.mode, report.cache_hits, report.total_rows
            ),
            use_color
        )
    );
    Ok(())
}
