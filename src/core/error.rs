//! Pipeline error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::adapters::{InferenceError, StoreError};
use crate::domain::{InvalidTransition, ValidationError};

/// Message shown to the client when taxonomy discovery comes back empty
pub const NO_CATEGORIES_MESSAGE: &str =
    "No requirement types could be identified in the documents";

/// Errors raised while running the extraction pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{}", NO_CATEGORIES_MESSAGE)]
    NoCategoriesFound,

    /// Retries ran out on a transient failure; the category is skipped
    #[error("Extraction for '{category}' failed after {attempts} attempts: {source}")]
    CategoryExtractionExhausted {
        category: String,
        attempts: u32,
        #[source]
        source: InferenceError,
    },

    /// Non-retryable inference failure; the category is skipped
    #[error("Extraction for '{category}' failed: {source}")]
    InferenceFatal {
        category: String,
        #[source]
        source: InferenceError,
    },

    #[error("No text could be extracted from the selected documents")]
    EmptyCorpus,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run exceeded the time limit of {0:?}")]
    TimedOut(Duration),

    #[error("Failed to save requirements: {0}")]
    Persistence(#[from] StoreError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Whether the error only drops one category instead of failing the run
    pub fn is_category_skip(&self) -> bool {
        matches!(
            self,
            PipelineError::CategoryExtractionExhausted { .. } | PipelineError::InferenceFatal { .. }
        )
    }

    /// Human-facing summary for the `error` event
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::NoCategoriesFound => NO_CATEGORIES_MESSAGE,
            PipelineError::Validation(_) => "The extraction request is invalid",
            PipelineError::EmptyCorpus => "The selected documents contain no readable text",
            PipelineError::Cancelled => "Requirement extraction was cancelled",
            PipelineError::TimedOut(_) => "Requirement extraction took too long",
            _ => "Requirement extraction failed",
        }
    }
}

impl From<InvalidTransition> for PipelineError {
    fn from(err: InvalidTransition) -> Self {
        PipelineError::Unexpected(err.to_string())
    }
}
