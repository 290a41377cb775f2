//! Main orchestrator for requirement extraction.
//!
//! Runs the stages in order (corpus, taxonomy, per-category extraction,
//! persistence), narrating each step to a progress sink. A run always ends
//! with exactly one `end` event, preceded by `complete` or `error`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::adapters::{ContentExtractor, InferenceClient, RequirementStore};
use crate::domain::{ExtractionRequest, PipelineRun, ProgressUpdate, Requirement, SourceDocument, Stage};

use super::aggregator::Aggregator;
use super::cancel::CancelToken;
use super::clock::{Clock, TokioClock};
use super::error::PipelineError;
use super::extraction::CategoryExtractor;
use super::governor::RateGovernor;
use super::pipeline::PipelineSettings;
use super::progress::{
    extraction_percent, progress_channel, Narrator, ProgressReceiver, ProgressSink, ANALYZING_PERCENT,
    CORPUS_READY_PERCENT, DISCOVERING_PERCENT, SAVING_PERCENT, TAXONOMY_READY_PERCENT,
};
use super::taxonomy::discover_categories;

/// Main pipeline orchestrator
pub struct Orchestrator {
    inference: Arc<dyn InferenceClient>,
    content: Arc<dyn ContentExtractor>,
    store: Arc<dyn RequirementStore>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl Orchestrator {
    /// Create a new orchestrator on the real clock
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        content: Arc<dyn ContentExtractor>,
        store: Arc<dyn RequirementStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            inference,
            content,
            store,
            clock: Arc::new(TokioClock),
            settings,
        }
    }

    /// Replace the clock used for governor and backoff sleeps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start a run on its own task and hand back the event stream.
    ///
    /// Dropping the receiver cancels the run.
    pub fn spawn(
        self: &Arc<Self>,
        request: ExtractionRequest,
        documents: Vec<SourceDocument>,
    ) -> (ProgressReceiver, JoinHandle<PipelineRun>) {
        let cancel = CancelToken::new();
        let (sink, receiver) = progress_channel(self.settings.keepalive(), &cancel);
        let orchestrator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(orchestrator.run(&request, documents, &sink, &cancel))
                .catch_unwind()
                .await;

            match outcome {
                Ok(run) => run,
                Err(panic) => {
                    // A panicked run still closes the stream with error, end
                    let detail = panic_message(panic.as_ref());
                    let err = PipelineError::Unexpected(format!("run panicked: {}", detail));
                    error!(project = %request.project_id(), error = %err, "Extraction task panicked");

                    let mut narrator = Narrator::new(&sink);
                    narrator.error(err.user_message(), err.to_string());
                    narrator.end();

                    let mut run = PipelineRun::new(&request);
                    if let Err(e) = run.fail(err.to_string()) {
                        error!(run_id = %run.id, error = %e, "Run state transition rejected");
                    }
                    run
                }
            }
        });

        (receiver, handle)
    }

    /// Execute one extraction run to completion.
    ///
    /// Failures are narrated and recorded in the returned run state rather
    /// than returned as errors.
    #[instrument(skip_all, fields(project = %request.project_id(), documents = request.document_ids().len()))]
    pub async fn run(
        &self,
        request: &ExtractionRequest,
        documents: Vec<SourceDocument>,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineRun {
        let mut run = PipelineRun::new(request);
        let mut narrator = Narrator::new(sink);
        info!(run_id = %run.id, "Starting requirement extraction");

        narrator.start(format!(
            "Starting requirement extraction for {} documents",
            documents.len()
        ));

        let timeout = self.settings.run_timeout();
        let outcome = match tokio::time::timeout(
            timeout,
            self.execute(&mut run, request, &documents, &mut narrator, cancel),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::TimedOut(timeout)),
        };

        let transition = match outcome {
            Ok(requirements) => {
                info!(
                    run_id = %run.id,
                    requirements = requirements.len(),
                    skipped = run.skipped_categories.len(),
                    "Requirement extraction completed"
                );
                narrator.complete(&requirements);
                run.complete(requirements)
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Requirement extraction failed");
                narrator.error(e.user_message(), e.to_string());
                run.fail(e.to_string())
            }
        };
        if let Err(e) = transition {
            error!(run_id = %run.id, error = %e, "Run state transition rejected");
        }

        narrator.end();
        run
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        request: &ExtractionRequest,
        documents: &[SourceDocument],
        narrator: &mut Narrator<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<Requirement>, PipelineError> {
        run.start()?;

        // Corpus
        narrator.progress(ProgressUpdate::new(
            Stage::Analyzing,
            format!("Analyzing {} documents", documents.len()),
            ANALYZING_PERCENT,
        ));
        let corpus = self.build_corpus(documents)?;
        narrator.progress(ProgressUpdate::new(
            Stage::Analyzing,
            "Documents analyzed",
            CORPUS_READY_PERCENT,
        ));

        // Taxonomy
        cancel.check()?;
        narrator.progress(ProgressUpdate::new(
            Stage::Discovering,
            "Identifying requirement types",
            DISCOVERING_PERCENT,
        ));
        let categories = cancel
            .run_until_cancelled(discover_categories(self.inference.as_ref(), &corpus))
            .await??;

        let mut governor = RateGovernor::new(self.settings.rate_interval(), Arc::clone(&self.clock));
        governor.release();

        let total = categories.len();
        run.categories = categories.clone();
        narrator.progress(
            ProgressUpdate::new(
                Stage::Discovering,
                format!("Found {} requirement types", total),
                TAXONOMY_READY_PERCENT,
            )
            .with_types(0, total),
        );

        // Extraction, strictly one category at a time
        let extractor = CategoryExtractor {
            client: self.inference.as_ref(),
            policy: &self.settings.retry_policy,
            clock: self.clock.as_ref(),
            cancel,
        };
        let mut aggregator = Aggregator::new(request);

        for (index, category) in categories.iter().enumerate() {
            cancel.check()?;
            cancel.run_until_cancelled(governor.acquire()).await?;

            narrator.progress(
                ProgressUpdate::new(
                    Stage::Extracting,
                    format!("Extracting {} requirements", category),
                    extraction_percent(index, total),
                )
                .with_types(index, total)
                .with_current_type(category),
            );

            let result = extractor.extract(category, &corpus, narrator).await;
            governor.release();

            let extracted = match result {
                Ok(candidates) => {
                    run.record_category(category, true);
                    let count = candidates.len();
                    aggregator.push(candidates);
                    count
                }
                Err(e) if e.is_category_skip() => {
                    warn!(category = %category, error = %e, "Skipping category");
                    run.record_category(category, false);
                    0
                }
                Err(e) => return Err(e),
            };

            narrator.progress(
                ProgressUpdate::new(
                    Stage::Extracting,
                    format!("Processed {} requirements", category),
                    extraction_percent(index + 1, total),
                )
                .with_types(index + 1, total)
                .with_current_type(category)
                .with_counts(extracted, aggregator.len()),
            );
        }

        // Persistence
        cancel.check()?;
        narrator.progress(
            ProgressUpdate::new(
                Stage::Saving,
                format!("Saving {} requirements", aggregator.len()),
                SAVING_PERCENT,
            )
            .with_counts(aggregator.len(), aggregator.len()),
        );
        let requirements = aggregator.stamp(Utc::now());
        self.store.save_all(&requirements).await?;

        Ok(requirements)
    }

    /// Concatenate the text of every readable document.
    ///
    /// Documents whose text cannot be extracted are skipped.
    fn build_corpus(&self, documents: &[SourceDocument]) -> Result<String, PipelineError> {
        let mut corpus = String::new();

        for document in documents {
            let text = match self.content.extract_text(&document.bytes, &document.mime_type) {
                Ok(text) => text,
                Err(e) => {
                    warn!(document = %document.id, error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            if text.trim().is_empty() {
                warn!(document = %document.id, "Skipping empty document");
                continue;
            }
            corpus.push_str(&format!("=== Document: {} ===\n{}\n\n", document.name, text));
        }

        if corpus.is_empty() {
            return Err(PipelineError::EmptyCorpus);
        }
        Ok(corpus)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
