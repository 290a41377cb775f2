//! Command-line interface for bidreq.
//!
//! Provides commands for running an extraction locally, serving the
//! streaming API, listing stored requirements, and showing configuration.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::adapters::{
    DocumentStore, FsDocumentStore, GeminiClient, JsonlRequirementStore, PlainTextExtractor,
    RequirementStore,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{CancelToken, Orchestrator, ProgressSink};
use crate::domain::{ExtractionRequest, ProgressEvent, RunState};
use crate::server::{self, AppState};

/// bidreq - Bid-qualification requirement extraction
#[derive(Parser, Debug)]
#[command(name = "bidreq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract requirements from project documents, printing events as JSON lines
    Extract {
        /// Project ID (directory under the document root)
        #[arg(short, long)]
        project: String,

        /// Document IDs (file stems inside the project directory)
        #[arg(short, long = "document", required = true, num_args = 1..)]
        documents: Vec<String>,
    },

    /// Start the HTTP server
    Serve {
        /// Address to bind to (defaults to the configured address)
        #[arg(short, long, env = "BIDREQ_ADDRESS")]
        address: Option<SocketAddr>,
    },

    /// List stored requirements for a project
    Requirements {
        /// Project ID
        #[arg(short, long)]
        project: String,

        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Extract { project, documents } => run_extraction(project, documents).await,
            Commands::Serve { address } => serve(address).await,
            Commands::Requirements { project, json } => list_requirements(&project, json).await,
            Commands::Config => show_config(),
        }
    }
}

/// Prints every event as one JSON line on stdout
struct JsonLinesSink {
    out: Mutex<std::io::Stdout>,
}

impl JsonLinesSink {
    fn new() -> Self {
        Self {
            out: Mutex::new(std::io::stdout()),
        }
    }
}

impl ProgressSink for JsonLinesSink {
    fn emit(&self, event: ProgressEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!(error = %e, "Failed to write event");
        }
    }
}

/// Everything a run or the server needs, built from configuration
struct Components {
    documents: Arc<FsDocumentStore>,
    requirements: Arc<JsonlRequirementStore>,
    orchestrator: Arc<Orchestrator>,
}

async fn build_components(cfg: &ResolvedConfig) -> Result<Components> {
    let requirements = Arc::new(
        JsonlRequirementStore::open(cfg.requirements_dir())
            .await
            .with_context(|| {
                format!(
                    "Failed to open requirement store: {}",
                    cfg.requirements_dir().display()
                )
            })?,
    );
    let inference = Arc::new(GeminiClient::new(cfg.inference.gemini_config()?)?);

    let orchestrator = Arc::new(Orchestrator::new(
        inference,
        Arc::new(PlainTextExtractor::new()),
        requirements.clone(),
        cfg.pipeline.clone(),
    ));

    Ok(Components {
        documents: Arc::new(FsDocumentStore::new(&cfg.documents)),
        requirements,
        orchestrator,
    })
}

/// Run one extraction in the foreground
async fn run_extraction(project: String, document_ids: Vec<String>) -> Result<()> {
    let cfg = config::config()?;
    let components = build_components(cfg).await?;

    let request = ExtractionRequest::new(project, document_ids)?;
    let documents = components
        .documents
        .resolve(&request)
        .await
        .context("Failed to load documents")?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let sink = JsonLinesSink::new();
    let run = components
        .orchestrator
        .run(&request, documents, &sink, &cancel)
        .await;

    match run.state {
        RunState::Completed => {
            eprintln!(
                "Extracted {} requirements ({} of {} categories skipped)",
                run.requirements.len(),
                run.skipped_categories.len(),
                run.categories.len()
            );
            Ok(())
        }
        RunState::Failed { error } => anyhow::bail!("Extraction failed: {}", error),
        other => anyhow::bail!("Run ended in unexpected state: {:?}", other),
    }
}

/// Start the HTTP server
async fn serve(address: Option<SocketAddr>) -> Result<()> {
    let cfg = config::config()?;
    let components = build_components(cfg).await?;

    let state = AppState {
        documents: components.documents,
        requirements: components.requirements,
        orchestrator: components.orchestrator,
    };

    server::serve(address.unwrap_or(cfg.server_address), state).await
}

/// List stored requirements for a project
async fn list_requirements(project: &str, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let store = JsonlRequirementStore::open(cfg.requirements_dir()).await?;
    let requirements = store.list(project).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&requirements)?);
        return Ok(());
    }

    if requirements.is_empty() {
        println!("No requirements found for project {}", project);
        return Ok(());
    }

    println!("{:<16} {:<10} {:<50}", "TYPE", "PRIORITY", "TITLE");
    println!("{}", "-".repeat(78));

    for requirement in &requirements {
        println!(
            "{:<16} {:<10} {:<50}",
            requirement.kind,
            requirement.priority,
            truncate(&requirement.title, 50)
        );
    }
    println!();
    println!("{} requirements", requirements.len());

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home (engine state): {}", cfg.home.display());
    println!("  Documents:           {}", cfg.documents.display());
    println!("  Requirements:        {}", cfg.requirements_dir().display());
    println!();
    println!("Inference:");
    println!("  Model:    {}", cfg.inference.model);
    println!("  Base URL: {}", cfg.inference.base_url);
    println!(
        "  API key:  ${} ({})",
        cfg.inference.api_key_env,
        if std::env::var(&cfg.inference.api_key_env).is_ok() {
            "set"
        } else {
            "not set"
        }
    );
    println!("  Timeout:  {}s", cfg.inference.request_timeout_seconds);
    println!();
    println!("Pipeline:");
    print!("{}", serde_yaml::to_string(&cfg.pipeline)?);
    println!();
    println!("Server address: {}", cfg.server_address);

    Ok(())
}
