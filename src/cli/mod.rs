//! CLI interface using clap
//!
//! Provides the command-line interface for qaforge

mod commands;

pub use commands::*;

use crate::extract::DocumentKind;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// qaforge - grounded QA test case and automation script generator
#[derive(Parser, Debug)]
#[command(name = "qaforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the project (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    pub path: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// API key for the generation service
    #[arg(long, global = true, env = "QAFORGE_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// API key for the embedding service
    #[arg(
        long,
        global = true,
        env = "QAFORGE_EMBEDDING_API_KEY",
        hide_env_values = true
    )]
    pub embedding_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize qaforge in a directory
    Init(InitArgs),

    /// Build the knowledge base from support documents
    Build(BuildArgs),

    /// Show the passages retrieved for a query
    Search(SearchArgs),

    /// Generate test cases from the knowledge base
    Generate(GenerateArgs),

    /// Generate a Selenium script for a stored test case
    Script(ScriptArgs),

    /// Show knowledge base statistics
    Status,

    /// Clear the knowledge base
    Reset,

    /// List stored test cases
    List,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite configuration and database
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Add to the existing knowledge base instead of rebuilding it
    #[arg(short, long)]
    pub append: bool,
}

/// Arguments for search command
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Query text
    pub query: String,

    /// Number of passages (defaults to retrieval.top_k)
    #[arg(short = 'k', long, allow_negative_numbers = true)]
    pub top_k: Option<i64>,

    /// Only passages from this kind of document (text, markdown, json, html, pdf)
    #[arg(long)]
    pub kind: Option<DocumentKind>,

    /// Only passages from this source file (repeatable)
    #[arg(long)]
    pub source: Vec<String>,
}

/// Arguments for generate command
#[derive(Parser, Debug)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["query", "exhaustive", "feature"]),
))]
pub struct GenerateArgs {
    /// Free-text request
    #[arg(short, long)]
    pub query: Option<String>,

    /// Cover every functional area
    #[arg(short, long)]
    pub exhaustive: bool,

    /// Cover one named feature
    #[arg(short, long)]
    pub feature: Option<String>,
}

/// Arguments for script command
#[derive(Parser, Debug)]
pub struct ScriptArgs {
    /// Test case ID (or unique prefix)
    pub test_case_id: String,

    /// Write the script to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Ingested HTML page to resolve selectors against
    #[arg(long)]
    pub page: Option<String>,

    /// URL the script opens (defaults to script.page_url)
    #[arg(long)]
    pub url: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
