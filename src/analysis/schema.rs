//! Strict JSON schema for structured model output.
//!
//! Mirrors [`crate::models::AnalysisResponse`]: every property is required
//! and no object admits additional properties.

use serde_json::{json, Value};

/// Name reported to the API for the response format.
pub const SCHEMA_NAME: &str = "analysis_response";

fn number_array() -> Value {
    json!({ "type": "array", "items": { "type": "number" } })
}

fn string_array() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

/// Closed object with all listed properties required.
fn object(properties: Vec<(&str, Value)>) -> Value {
    let required: Vec<&str> = properties.iter().map(|(name, _)| *name).collect();
    let properties: serde_json::Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// The analysis response schema.
pub fn response_schema() -> Value {
    let string = || json!({ "type": "string" });

    let s_curve = object(vec![
        ("x", number_array()),
        ("y", number_array()),
        ("description", string()),
    ]);

    let hype_series = object(vec![("name", string()), ("data", number_array())]);
    let hype_curve = object(vec![
        ("x", number_array()),
        ("series", json!({ "type": "array", "items": hype_series })),
        ("description", string()),
    ]);

    let innovation_usage = object(vec![
        ("x", string_array()),
        ("y", number_array()),
        ("description", string()),
    ]);

    let graphs = object(vec![
        ("s_curve", s_curve),
        ("hype_curve", hype_curve),
        ("innovation_usage", innovation_usage),
    ]);

    let technology_convergence = object(vec![
        ("technologies", string_array()),
        ("convergence_scores", number_array()),
        ("description", string()),
    ]);

    let metadata = object(vec![
        ("source_documents", string_array()),
        ("filters_used", string_array()),
        ("timestamp", string()),
    ]);

    object(vec![
        ("generated_text", string()),
        ("graphs", graphs),
        ("technology_convergence", technology_convergence),
        ("summary", string()),
        ("metadata", metadata),
    ])
}

/// The `response_format` body for a chat completion request.
pub fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": response_schema()
        }
    })
}
