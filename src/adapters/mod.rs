//! Contracts for the collaborators the pipeline depends on.
//!
//! The orchestrator only sees these traits. Implementations:
//! - `gemini`: HTTP inference client with schema-constrained output
//! - `content`: plain-text content extractor
//! - `documents`: filesystem document store (request validation)
//! - `requirements`: JSONL requirement store
//! - `memory`: in-memory stores for tests and demos

pub mod content;
pub mod documents;
pub mod gemini;
pub mod memory;
pub mod requirements;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ExtractionRequest, Requirement, SourceDocument, ValidationError};

pub use content::PlainTextExtractor;
pub use documents::FsDocumentStore;
pub use gemini::{GeminiClient, GeminiConfig};
pub use memory::{MemoryDocumentStore, MemoryRequirementStore};
pub use requirements::JsonlRequirementStore;

/// Failures worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// Provider reports it is overloaded or unavailable
    Overloaded,

    /// The request timed out
    Timeout,

    /// Quota or rate limit hit
    RateLimited,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransientKind::Overloaded => "overloaded",
            TransientKind::Timeout => "timeout",
            TransientKind::RateLimited => "rate limited",
        })
    }
}

/// Failures that will not go away by asking again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// The provider rejected the request (bad prompt, schema, model)
    InvalidRequest,

    /// Missing or rejected credentials
    Unauthorized,

    /// Output did not match the declared schema
    MalformedResponse,

    /// Connection could not be established
    Transport,

    /// Any other provider-side failure
    Provider,
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FatalKind::InvalidRequest => "invalid request",
            FatalKind::Unauthorized => "unauthorized",
            FatalKind::MalformedResponse => "malformed response",
            FatalKind::Transport => "transport failure",
            FatalKind::Provider => "provider error",
        })
    }
}

/// Error returned by an inference client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("Inference {kind}: {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("Inference {kind}: {message}")]
    Fatal { kind: FatalKind, message: String },
}

impl InferenceError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }

    /// Overload, timeout and rate limiting are retryable; everything else is not
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::Transient { .. })
    }
}

/// Executes one schema-constrained generation request
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Generate JSON matching `schema` for `prompt`
    async fn extract(&self, prompt: &str, schema: &Value) -> Result<Value, InferenceError>;
}

/// Error returned by a content extractor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("Unsupported content type: {mime_type}")]
    Unsupported { mime_type: String },
}

/// Normalizes document bytes into plain text
pub trait ContentExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8], mime_type: &str) -> Result<String, ContentError>;
}

/// Error returned by the document and requirement stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resolves the documents of a request, validating that they exist and
/// belong to the project
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn resolve(&self, request: &ExtractionRequest) -> Result<Vec<SourceDocument>, StoreError>;
}

/// Persists stamped requirements
#[async_trait]
pub trait RequirementStore: Send + Sync {
    /// Persist every requirement of one run
    async fn save_all(&self, requirements: &[Requirement]) -> Result<(), StoreError>;

    /// All requirements stored for a project, in insertion order
    async fn list(&self, project_id: &str) -> Result<Vec<Requirement>, StoreError>;
}
