//! Domain types for bidreq.
//!
//! This module contains the core data structures:
//! - Request: what the client asked for and the documents it resolved to
//! - Requirement: candidates returned by the model and stamped records
//! - Events: the progress stream narrated during a run
//! - Run: ephemeral state of one extraction run

pub mod events;
pub mod request;
pub mod requirement;
pub mod run;

// Re-export commonly used types
pub use events::{ProgressEvent, ProgressUpdate, Stage};
pub use request::{ExtractionRequest, SourceDocument, ValidationError};
pub use requirement::{
    Priority, Requirement, RequirementCandidate, RequirementMetadata, RequirementStatus,
    GENERATION_METHOD,
};
pub use run::{InvalidTransition, PipelineRun, RunState};
