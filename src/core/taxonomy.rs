//! Taxonomy discovery: one inference call naming the requirement categories.

use serde_json::Value;
use tracing::{info, warn};

use super::error::PipelineError;
use super::prompts::{taxonomy_prompt, taxonomy_schema};
use crate::adapters::InferenceClient;

/// Ask the model for the requirement categories present in `corpus`.
///
/// There is no retry here; any inference failure or an empty answer ends the
/// run with `NoCategoriesFound`.
pub async fn discover_categories(
    client: &dyn InferenceClient,
    corpus: &str,
) -> Result<Vec<String>, PipelineError> {
    let response = match client.extract(&taxonomy_prompt(corpus), &taxonomy_schema()).await {
        Ok(response) => response,
        Err(e) => {
            warn!(client = client.name(), error = %e, "Taxonomy discovery failed");
            return Err(PipelineError::NoCategoriesFound);
        }
    };

    let categories = parse_categories(&response);
    if categories.is_empty() {
        warn!("Taxonomy discovery returned no categories");
        return Err(PipelineError::NoCategoriesFound);
    }

    info!(count = categories.len(), categories = ?categories, "Requirement types discovered");
    Ok(categories)
}

/// Trimmed, de-duplicated labels in first-seen order.
///
/// Accepts `{"requirement_types": [...]}` or a bare array.
pub fn parse_categories(response: &Value) -> Vec<String> {
    let items = response
        .get("requirement_types")
        .unwrap_or(response)
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut categories: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let Some(label) = item.as_str().map(str::trim) else {
            continue;
        };
        if label.is_empty() || categories.iter().any(|c| c == label) {
            continue;
        }
        categories.push(label.to_string());
    }
    categories
}
