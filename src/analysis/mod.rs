//! Query analysis pipeline.
//!
//! This module builds the prompts and response schema, calls the
//! language model, and validates its reply.

pub mod agent;
pub mod prompt;
pub mod schema;

pub use agent::{AgentConfig, ForecastAgent, QueryAnalyzer};
