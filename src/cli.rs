//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// SmartTech Forecast Engine - AI-powered technology trend analysis
///
/// Runs the forecast HTTP service, or analyzes a single query from the
/// terminal and prints the report.
///
/// Examples:
///   smarttech
///   smarttech --bind 0.0.0.0:8080
///   smarttech --query "solid-state batteries"
///   smarttech --query "edge AI" --format json --output edge-ai.json
///   smarttech --query "edge AI" --dry-run
///   smarttech --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Analyze this query once and exit instead of serving HTTP
    #[arg(long, value_name = "TEXT")]
    pub query: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for smarttech.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address for the HTTP server
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Language model to use for analysis
    #[arg(short, long)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, value_name = "URL")]
    pub api_base: Option<String>,

    /// Temperature for LLM responses (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens in the model response
    #[arg(long, value_name = "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Model request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// SQLite database file for user accounts
    #[arg(long, value_name = "FILE")]
    pub database: Option<String>,

    /// Output file for --query reports (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format for --query reports (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Dry run: print the prompts and schema for --query without calling the model
    #[arg(long, requires = "query")]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default smarttech.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref query) = self.query {
            if query.trim().is_empty() {
                return Err("Query must not be empty".to_string());
            }
        }

        if let Some(ref api_base) = self.api_base {
            if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
                return Err("API base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if self.max_tokens == Some(0) {
            return Err("Max tokens must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
