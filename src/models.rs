//! Data models for the forecast engine.
//!
//! This module contains the analysis response shape returned by the
//! language model and served to clients, plus the JSON envelope used by
//! the HTTP API. Every struct rejects unknown fields so that a parsed
//! value always conforms to the schema sent to the model.

use crate::error::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Scale applied to patent filings to derive the market-adoption series.
pub const MARKET_ADOPTION_RATIO: f64 = 0.85;

/// S-curve of technology maturity over time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SCurve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub description: String,
}

/// One named series on the hype cycle chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HypeCurveSeries {
    pub name: String,
    pub data: Vec<f64>,
}

/// Hype cycle: a shared x axis with several named series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HypeCurve {
    pub x: Vec<f64>,
    pub series: Vec<HypeCurveSeries>,
    pub description: String,
}

/// Innovation usage by period label (e.g. "Q1-2024").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InnovationUsage {
    pub x: Vec<String>,
    pub y: Vec<f64>,
    pub description: String,
}

impl InnovationUsage {
    /// Market adoption derived from the filing counts.
    pub fn market_adoption(&self) -> Vec<f64> {
        self.y.iter().map(|v| v * MARKET_ADOPTION_RATIO).collect()
    }
}

/// The chart series of an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Graphs {
    pub s_curve: SCurve,
    pub hype_curve: HypeCurve,
    pub innovation_usage: InnovationUsage,
}

/// Technologies converging with the queried one, paired by index with scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnologyConvergence {
    pub technologies: Vec<String>,
    pub convergence_scores: Vec<f64>,
    pub description: String,
}

impl TechnologyConvergence {
    /// Technology/score pairs. Unpaired trailing entries are dropped.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.technologies
            .iter()
            .map(String::as_str)
            .zip(self.convergence_scores.iter().copied())
    }
}

/// Provenance of an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub source_documents: Vec<String>,
    pub filters_used: Vec<String>,
    /// ISO-8601 timestamp.
    pub timestamp: String,
}

/// The complete analysis returned for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisResponse {
    pub generated_text: String,
    pub graphs: Graphs,
    pub technology_convergence: TechnologyConvergence,
    pub summary: String,
    pub metadata: Metadata,
}

const UNAVAILABLE_SUMMARY: &str = "Analysis unavailable.";

impl AnalysisResponse {
    /// Parse and validate a model reply.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Placeholder returned when the model cannot produce an analysis.
    pub fn unavailable(query: &str) -> Self {
        Self {
            generated_text: format!("Unable to analyze \"{}\".", query),
            graphs: Graphs::default(),
            technology_convergence: TechnologyConvergence::default(),
            summary: UNAVAILABLE_SUMMARY.to_string(),
            metadata: Metadata {
                source_documents: Vec::new(),
                filters_used: Vec::new(),
                timestamp: iso_timestamp(),
            },
        }
    }

    /// Whether this is the placeholder produced by [`AnalysisResponse::unavailable`].
    pub fn is_unavailable(&self) -> bool {
        self.summary == UNAVAILABLE_SUMMARY
            && self.graphs == Graphs::default()
            && self.technology_convergence == TechnologyConvergence::default()
    }
}

/// Current time as `2024-01-01T00:00:00.000Z`.
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// JSON envelope for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
