// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// docqa - Ask questions about your documents
///
/// Ingests PDFs and text files into a local exact vector index and answers
/// questions from their content with retrieval-augmented generation.
#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Config file (defaults to .docqarc.toml, then ~/.config/docqa/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Index directory (defaults to the nearest .docqa directory)
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, chunk and embed documents into the index
    Ingest {
        /// Files or directories (pdf, txt, md)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Add to the existing corpus instead of replacing it
        #[arg(long, conflicts_with = "replace")]
        append: bool,

        /// Replace the existing corpus (default unless configured otherwise)
        #[arg(long)]
        replace: bool,

        /// Encode every chunk, ignoring the embedding cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Answer a question from the indexed documents
    Query {
        /// Question in natural language
        question: String,

        /// Number of chunks used as context
        #[arg(short = 'k', long)]
        top_k: Option<NonZeroUsize>,

        /// Print the chunks the answer was based on
        #[arg(long)]
        show_sources: bool,
    },

    /// Show the chunks most similar to a query, with scores
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<NonZeroUsize>,
    },

    /// Show index status
    Status,

    /// Run the HTTP API
    Serve {
        /// Address to bind (host:port)
        #[arg(long)]
        bind: Option<String>,

        /// Reload the corpus when the index files change on disk
        #[arg(long)]
        watch: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
