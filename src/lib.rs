//! bidreq - Bid-qualification requirement extraction
//!
//! Turns a project's tender documents into a categorized list of
//! bid-qualification requirements using a generative model, while
//! streaming progress to the caller.
//!
//! # Architecture
//!
//! A run is a fixed sequence of stages:
//! - the document texts are concatenated into one corpus
//! - one taxonomy call names the requirement categories
//! - one extraction call per category, strictly in order, each retried on
//!   transient failures and spaced by a rate governor; a category that
//!   keeps failing is skipped
//! - the results are stamped and persisted in one write
//!
//! Every step is narrated as a `ProgressEvent`. The HTTP server streams
//! them as Server-Sent Events; the CLI prints them as JSON lines.
//!
//! # Modules
//!
//! - `adapters`: Collaborator contracts and implementations (Gemini,
//!   document and requirement stores, text extraction)
//! - `core`: Orchestration logic (stages, retry, rate governor, progress)
//! - `domain`: Data structures (requests, requirements, events, run state)
//! - `server`: HTTP transport
//! - `cli`: Command-line interface
//! - `testing`: Test doubles for the pipeline
//!
//! # Usage
//!
//! ```bash
//! # Run an extraction locally
//! bidreq extract --project tender-42 -d notice -d annex-a
//!
//! # Serve the streaming API
//! bidreq serve --address 127.0.0.1:8080
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod testing;

// Re-export main types at crate root for convenience
pub use core::{CancelToken, Orchestrator, PipelineError, PipelineSettings, ProgressSink};
pub use domain::{
    ExtractionRequest, PipelineRun, Priority, ProgressEvent, Requirement, RequirementCandidate,
    RunState, SourceDocument,
};
