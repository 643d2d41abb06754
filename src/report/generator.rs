//! Report generation.
//!
//! Renders one analysis as Markdown, with each chart flattened into a
//! table, or as pretty-printed JSON.

use crate::models::{AnalysisResponse, HypeCurve, InnovationUsage, Metadata, SCurve, TechnologyConvergence};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(query: &str, analysis: &AnalysisResponse) -> String {
    let mut output = String::new();

    output.push_str("# SmartTech Forecast Report\n\n");
    output.push_str(&format!("**Query:** \"{}\"\n\n", query));

    output.push_str(&generate_text_section("AI-Generated Analysis", &analysis.generated_text));
    output.push_str(&generate_text_section("Executive Summary", &analysis.summary));

    output.push_str(&generate_s_curve_section(&analysis.graphs.s_curve));
    output.push_str(&generate_hype_curve_section(&analysis.graphs.hype_curve));
    output.push_str(&generate_innovation_usage_section(
        &analysis.graphs.innovation_usage,
    ));
    output.push_str(&generate_convergence_section(&analysis.technology_convergence));

    output.push_str(&generate_metadata_section(&analysis.metadata));
    output.push_str(&generate_footer());

    output
}

fn generate_text_section(title: &str, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!("## {}\n\n{}\n\n", title, text)
}

/// Description paragraph, or a note when the chart has no data.
fn chart_preamble(description: &str, has_data: bool) -> String {
    let mut section = String::new();
    if !description.is_empty() {
        section.push_str(&format!("{}\n\n", description));
    }
    if !has_data {
        section.push_str("*No data available.*\n\n");
    }
    section
}

fn generate_s_curve_section(curve: &SCurve) -> String {
    let mut section = String::from("## S-Curve Analysis\n\n");
    section.push_str(&chart_preamble(&curve.description, !curve.x.is_empty()));
    if curve.x.is_empty() {
        return section;
    }

    section.push_str("| Year | Patent Count |\n");
    section.push_str("|:---|---:|\n");
    for (x, y) in curve.x.iter().zip(&curve.y) {
        section.push_str(&format!("| {} | {} |\n", x, y));
    }
    section.push('\n');

    section
}

fn generate_hype_curve_section(curve: &HypeCurve) -> String {
    let mut section = String::from("## Hype Cycle\n\n");
    let has_data = !curve.x.is_empty() && !curve.series.is_empty();
    section.push_str(&chart_preamble(&curve.description, has_data));
    if !has_data {
        return section;
    }

    section.push_str("| Year |");
    for series in &curve.series {
        section.push_str(&format!(" {} |", series.name));
    }
    section.push_str("\n|:---|");
    section.push_str(&"---:|".repeat(curve.series.len()));
    section.push('\n');

    for (i, x) in curve.x.iter().enumerate() {
        section.push_str(&format!("| {} |", x));
        for series in &curve.series {
            match series.data.get(i) {
                Some(value) => section.push_str(&format!(" {} |", value)),
                None => section.push_str(" - |"),
            }
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

fn generate_innovation_usage_section(usage: &InnovationUsage) -> String {
    let mut section = String::from("## Innovation Usage & Adoption\n\n");
    section.push_str(&chart_preamble(&usage.description, !usage.x.is_empty()));
    if usage.x.is_empty() {
        return section;
    }

    section.push_str("| Period | Patent Filings | Market Adoption |\n");
    section.push_str("|:---|---:|---:|\n");
    let adoption = usage.market_adoption();
    for ((period, filings), adopted) in usage.x.iter().zip(&usage.y).zip(&adoption) {
        section.push_str(&format!("| {} | {} | {:.1} |\n", period, filings, adopted));
    }
    section.push('\n');

    section
}

fn generate_convergence_section(convergence: &TechnologyConvergence) -> String {
    let mut section = String::from("## Technology Convergence\n\n");
    section.push_str(&chart_preamble(
        &convergence.description,
        !convergence.technologies.is_empty(),
    ));

    let mut pairs: Vec<_> = convergence.pairs().collect();
    if pairs.is_empty() {
        return section;
    }
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

    section.push_str("| Technology | Convergence Score |\n");
    section.push_str("|:---|---:|\n");
    for (technology, score) in pairs {
        section.push_str(&format!("| {} | {} |\n", technology, score));
    }
    section.push('\n');

    section
}

fn generate_metadata_section(metadata: &Metadata) -> String {
    let mut section = String::from("## Analysis Metadata\n\n");

    if !metadata.source_documents.is_empty() {
        section.push_str("### Source Documents\n\n");
        for doc in &metadata.source_documents {
            section.push_str(&format!("- {}\n", doc));
        }
        section.push('\n');
    }

    if !metadata.filters_used.is_empty() {
        section.push_str("### Filters Applied\n\n");
        for filter in &metadata.filters_used {
            section.push_str(&format!("- {}\n", filter));
        }
        section.push('\n');
    }

    section.push_str(&format!("- **Generated:** {}\n\n", metadata.timestamp));

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by SmartTech Forecast Engine*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(analysis: &AnalysisResponse) -> Result<String> {
    serde_json::to_string_pretty(analysis).map_err(Into::into)
}
