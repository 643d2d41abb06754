//! Forecast agent backed by an OpenAI-compatible chat completions API.
//!
//! One request per query: the system and user prompts are sent together
//! with the strict response schema, and the reply is parsed into an
//! [`AnalysisResponse`]. Any failure along the way turns into the
//! placeholder analysis at the [`QueryAnalyzer`] boundary.

use crate::analysis::prompt::{user_prompt, SYSTEM_PROMPT};
use crate::analysis::schema::response_format;
use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::models::AnalysisResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for AgentConfig {
    fn from(model: &ModelConfig) -> Self {
        Self {
            api_base: model.api_base.trim_end_matches('/').to_string(),
            api_key: model.api_key.clone(),
            model_name: model.name.clone(),
            temperature: model.temperature,
            max_tokens: model.max_tokens,
            timeout_seconds: model.timeout_seconds,
        }
    }
}

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: Value,
    temperature: f32,
    max_tokens: u32,
}

/// Chat completion response body.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Produces an analysis for a query. Implementations never fail: errors
/// collapse into [`AnalysisResponse::unavailable`].
#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, query: &str) -> AnalysisResponse;
}

/// The forecast agent.
pub struct ForecastAgent {
    config: AgentConfig,
    http_client: reqwest::Client,
}

impl ForecastAgent {
    /// Create a new agent.
    pub fn new(config: AgentConfig) -> Result<Self> {
        info!(
            "Initializing forecast agent with model {} at {}",
            config.model_name, config.api_base
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ForecastError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Ask the model for a structured forecast and validate the reply.
    pub async fn request_forecast(&self, query: &str) -> Result<AnalysisResponse> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ForecastError::Config {
                message: "Missing OPENAI_API_KEY environment variable".to_string(),
            })?;

        let url = format!("{}/chat/completions", self.config.api_base);
        let request = ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", user_prompt(query)),
            ],
            response_format: response_format(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!("Sending forecast request for query: {}", query);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    format!("Cannot connect to model API at {}", self.config.api_base)
                } else {
                    format!("Failed to send request: {}", e)
                };
                ForecastError::ModelRequest { message }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ForecastError::ModelApi { status, body });
        }

        let completion: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| ForecastError::ModelRequest {
                    message: format!("Failed to parse model response: {}", e),
                })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ForecastError::EmptyResponse)?;

        AnalysisResponse::from_json(&content)
    }
}

#[async_trait]
impl QueryAnalyzer for ForecastAgent {
    async fn analyze(&self, query: &str) -> AnalysisResponse {
        match self.request_forecast(query).await {
            Ok(analysis) => {
                info!("Analysis complete for query: {}", query);
                analysis
            }
            Err(e) => {
                error!("Analysis error: {}", e);
                AnalysisResponse::unavailable(query)
            }
        }
    }
}
