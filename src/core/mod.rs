//! Core orchestration logic.
//!
//! This module contains:
//! - Orchestrator: runs the extraction stages and owns run state
//! - Taxonomy and category extraction stages with their prompts
//! - Retry executor, rate governor and the clock they sleep on
//! - Progress narration and the keepalive-aware event channel

pub mod aggregator;
pub mod cancel;
pub mod clock;
pub mod error;
pub mod extraction;
pub mod governor;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod taxonomy;

// Re-export commonly used types
pub use aggregator::Aggregator;
pub use cancel::{CancelOnDrop, CancelToken};
pub use clock::{Clock, TokioClock};
pub use error::PipelineError;
pub use extraction::{parse_candidates, CategoryExtractor};
pub use governor::RateGovernor;
pub use orchestrator::Orchestrator;
pub use pipeline::{PipelineSettings, RetryPolicy};
pub use progress::{progress_channel, ChannelSink, Narrator, NullSink, ProgressReceiver, ProgressSink};
pub use taxonomy::{discover_categories, parse_categories};
