// SPDX-License-Identifier: MIT OR Apache-2.0

//! docqa - Ask questions about your documents
//!
//! Ingests documents into a local exact vector index and answers questions
//! from them through an OpenAI-compatible chat endpoint.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::AppContext;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with DOCQA_LOG env var (e.g., DOCQA_LOG=debug docqa query "...")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DOCQA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::from_cli(&cli)?;

    match &cli.command {
        Commands::Ingest {
            paths,
            append,
            replace,
            no_cache,
        } => {
            commands::ingest::run(&ctx, paths, *append, *replace, *no_cache)?;
        }
        Commands::Query {
            question,
            top_k,
            show_sources,
        } => {
            commands::query::run(&ctx, question, *top_k, *show_sources)?;
        }
        Commands::Search { query, top_k } => {
            commands::search::run(&ctx, query, *top_k)?;
        }
        Commands::Status => {
            commands::status::run(&ctx)?;
        }
        Commands::Serve { bind, watch } => {
            commands::serve::run(&ctx, bind.as_deref(), *watch)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "docqa", &mut std::io::stdout());
        }
    }

    Ok(())
}
