//! Configuration for bidreq.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (BIDREQ_HOME, BIDREQ_DOCUMENTS, BIDREQ_MODEL)
//! 2. Config file (.bidreq/config.yaml)
//! 3. Defaults (~/.bidreq)
//!
//! Config file discovery:
//! - Searches current directory and parents for .bidreq/config.yaml
//! - `paths.home` is relative to the .bidreq/ directory, `paths.documents`
//!   to the project root (the directory holding .bidreq/)
//!
//! The inference API key is never stored in the config; it is read from the
//! environment variable named by `inference.api_key_env` when a client is
//! built.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::adapters::GeminiConfig;
use crate::core::PipelineSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const ENV_HOME: &str = "BIDREQ_HOME";
pub const ENV_DOCUMENTS: &str = "BIDREQ_DOCUMENTS";
pub const ENV_MODEL: &str = "BIDREQ_MODEL";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub inference: Option<InferenceConfig>,
    #[serde(default)]
    pub pipeline: Option<PipelineSettings>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .bidreq/)
    pub home: Option<String>,
    /// Document root (relative to the project root)
    pub documents: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferenceConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub address: Option<String>,
}

/// Inference settings after defaults are applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceSettings {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub request_timeout_seconds: u64,
    pub temperature: f32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            request_timeout_seconds: 300,
            temperature: 0.1,
        }
    }
}

impl InferenceSettings {
    /// Build a Gemini client config, reading the API key from the environment
    pub fn gemini_config(&self) -> Result<GeminiConfig> {
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{} is not set", self.api_key_env))?;

        let mut config = GeminiConfig::new(api_key);
        config.model = self.model.clone();
        config.base_url = self.base_url.clone();
        config.request_timeout = Duration::from_secs(self.request_timeout_seconds);
        config.temperature = self.temperature;
        Ok(config)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Engine state (persisted requirements live under it)
    pub home: PathBuf,
    /// Root of `<project_id>/<document_id>.<ext>` documents
    pub documents: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub inference: InferenceSettings,
    pub pipeline: PipelineSettings,
    /// Address `bidreq serve` binds to
    pub server_address: SocketAddr,
}

impl ResolvedConfig {
    /// Directory holding `<project_id>.jsonl` requirement files
    pub fn requirements_dir(&self) -> PathBuf {
        self.home.join("requirements")
    }
}

fn default_server_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".bidreq").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge the config file (if any), environment and defaults
fn resolve_config(
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
    default_home: PathBuf,
) -> Result<ResolvedConfig> {
    let config_file = file.as_ref().map(|(path, _)| path.to_path_buf());
    let (paths, inference, pipeline, server) = match file {
        Some((path, config)) => {
            // .bidreq/ and the project root that holds it
            let bidreq_dir = path.parent().unwrap_or(Path::new("."));
            let base_dir = bidreq_dir.parent().unwrap_or(Path::new("."));
            let home = config.paths.home.as_deref().map(|h| resolve_path(bidreq_dir, h));
            let documents = config
                .paths
                .documents
                .as_deref()
                .map(|d| resolve_path(base_dir, d));
            (
                (home, documents),
                config.inference.unwrap_or_default(),
                config.pipeline.unwrap_or_default(),
                config.server.unwrap_or_default(),
            )
        }
        None => (
            (None, None),
            InferenceConfig::default(),
            PipelineSettings::default(),
            ServerConfig::default(),
        ),
    };
    let (file_home, file_documents) = paths;

    let home = env(ENV_HOME)
        .map(PathBuf::from)
        .or(file_home)
        .unwrap_or(default_home);

    let documents = env(ENV_DOCUMENTS)
        .map(PathBuf::from)
        .or(file_documents)
        .unwrap_or_else(|| home.join("documents"));

    let defaults = InferenceSettings::default();
    let inference = InferenceSettings {
        model: env(ENV_MODEL)
            .or(inference.model)
            .unwrap_or(defaults.model),
        base_url: inference.base_url.unwrap_or(defaults.base_url),
        api_key_env: inference.api_key_env.unwrap_or(defaults.api_key_env),
        request_timeout_seconds: inference
            .request_timeout_seconds
            .unwrap_or(defaults.request_timeout_seconds),
        temperature: inference.temperature.unwrap_or(defaults.temperature),
    };

    pipeline.validate()?;

    let server_address = match server.address {
        Some(address) => address
            .parse()
            .with_context(|| format!("Invalid server address: {}", address))?,
        None => default_server_address(),
    };

    Ok(ResolvedConfig {
        home,
        documents,
        config_file,
        inference,
        pipeline,
        server_address,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".bidreq");

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    resolve_config(
        file.as_ref().map(|(path, config)| (path.as_path(), config.clone())),
        |key| std::env::var(key).ok(),
        default_home,
    )
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
