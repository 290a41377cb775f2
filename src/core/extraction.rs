//! Category extraction: one retried inference call per category.

use serde_json::Value;
use tracing::{debug, info};

use super::cancel::CancelToken;
use super::clock::Clock;
use super::error::PipelineError;
use super::pipeline::RetryPolicy;
use super::progress::Narrator;
use super::prompts::{category_prompt, requirements_schema};
use super::retry::{Retrier, RetryFailure};
use crate::adapters::InferenceClient;
use crate::domain::{Priority, RequirementCandidate};

/// Extracts requirement candidates for one category at a time
pub struct CategoryExtractor<'a> {
    pub client: &'a dyn InferenceClient,
    pub policy: &'a RetryPolicy,
    pub clock: &'a dyn Clock,
    pub cancel: &'a CancelToken,
}

impl<'a> CategoryExtractor<'a> {
    /// Extract candidates for `category` from `corpus`.
    ///
    /// Exhausted retries and fatal inference errors come back as
    /// `CategoryExtractionExhausted` and `InferenceFatal`; the caller decides
    /// to skip. Only `Cancelled` should end the run.
    pub async fn extract(
        &self,
        category: &str,
        corpus: &str,
        narrator: &mut Narrator<'_>,
    ) -> Result<Vec<RequirementCandidate>, PipelineError> {
        let prompt = category_prompt(category, corpus);
        let schema = requirements_schema();
        let (client, prompt, schema) = (self.client, prompt.as_str(), &schema);

        let retrier = Retrier {
            policy: self.policy,
            clock: self.clock,
            cancel: self.cancel,
        };

        let response = retrier
            .run(category, narrator, move || client.extract(prompt, schema))
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => {
                    PipelineError::CategoryExtractionExhausted {
                        category: category.to_string(),
                        attempts,
                        source: last,
                    }
                }
                RetryFailure::Fatal { error, .. } => PipelineError::InferenceFatal {
                    category: category.to_string(),
                    source: error,
                },
                RetryFailure::Cancelled => PipelineError::Cancelled,
            })?;

        let candidates = parse_candidates(category, &response);
        info!(category, count = candidates.len(), "Category extracted");
        Ok(candidates)
    }
}

/// Normalize the model's answer into candidates keyed by `category`.
///
/// Accepts `{"requirements": [...]}` or a bare array. Entries without a
/// title are dropped; `type` is always the category key.
pub fn parse_candidates(category: &str, response: &Value) -> Vec<RequirementCandidate> {
    let items = response
        .get("requirements")
        .unwrap_or(response)
        .as_array()
        .cloned()
        .unwrap_or_default();

    let field = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    items
        .iter()
        .filter_map(|item| {
            let title = field(item, "title");
            if title.is_empty() {
                debug!(category, "Dropping candidate without a title");
                return None;
            }
            let priority = Priority::parse_or_default(item.get("priority").and_then(Value::as_str));
            Some(RequirementCandidate::new(
                category,
                title,
                priority,
                field(item, "description"),
            ))
        })
        .collect()
}
