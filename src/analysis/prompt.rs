//! Prompts sent to the language model.

/// System prompt establishing the analyst persona.
pub const SYSTEM_PROMPT: &str = r#"You are an expert AI research analyst specializing in technology patents, innovation trends and convergence.
Provide:
- generated_text (analysis)
- graphs (s_curve, hype_curve, innovation_usage)
- technology_convergence
- summary
- metadata

Graphs must be realistic JSON data, including x values, y or series, and descriptions."#;

/// Build the user prompt for a query.
pub fn user_prompt(query: &str) -> String {
    format!(
        r#"Analyze: "{}"

Return JSON with:
- generated_text (3-4 paragraphs)
- graphs: s_curve, hype_curve, innovation_usage
- technology_convergence
- summary
- metadata

Graphs must be realistic data over time."#,
        query
    )
}
