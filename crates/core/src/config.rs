//! Configuration management for the Mesa CLI.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.mesa/config.yaml)
//!
//! The configuration is workspace-centric, with pipeline state stored in `.mesa/`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main application configuration.
///
/// This struct holds all global configuration options that affect
/// CLI behavior across commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .mesa/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Directory holding the corpus documents (defaults to `<workspace>/docs`)
    pub corpus_dir: Option<PathBuf>,

    /// Generation provider (e.g., "ollama", "openai", "openrouter")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Embedding provider (e.g., "trigram", "ollama")
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector dimensionality
    pub embedding_dimensions: usize,

    /// Provider endpoint override (e.g., an Ollama or OpenRouter base URL)
    pub endpoint: Option<String>,

    /// API key for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileConfig>,
    embedding: Option<EmbeddingFileConfig>,
    corpus: Option<CorpusFileConfig>,
    logging: Option<LoggingFileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmFileConfig {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    #[serde(rename = "apiKeyEnv")]
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingFileConfig {
    provider: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CorpusFileConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingFileConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            corpus_dir: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            embedding_provider: "trigram".to_string(), // Offline default
            embedding_model: "trigram".to_string(),
            embedding_dimensions: 384,
            endpoint: None,
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `MESA_WORKSPACE`: Override workspace path
    /// - `MESA_CONFIG`: Path to config file
    /// - `MESA_CORPUS`: Corpus directory
    /// - `MESA_PROVIDER`: Generation provider
    /// - `MESA_MODEL`: Generation model identifier
    /// - `MESA_EMBEDDING_PROVIDER` / `MESA_EMBEDDING_MODEL`: Embedding selection
    /// - `MESA_ENDPOINT`: Provider endpoint override
    /// - `MESA_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        // Load from environment variables
        if let Ok(workspace) = std::env::var("MESA_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("MESA_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        // Validate workspace exists
        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        // Load from YAML config file if it exists
        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".mesa/config.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(corpus) = std::env::var("MESA_CORPUS") {
            config.corpus_dir = Some(PathBuf::from(corpus));
        }

        if let Ok(provider) = std::env::var("MESA_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("MESA_MODEL") {
            config.model = model;
        }

        if let Ok(provider) = std::env::var("MESA_EMBEDDING_PROVIDER") {
            config.embedding_provider = provider;
        }

        if let Ok(model) = std::env::var("MESA_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        if let Ok(endpoint) = std::env::var("MESA_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }

        if config.api_key.is_none() {
            config.api_key = std::env::var("MESA_API_KEY").ok();
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        // Check for NO_COLOR environment variable
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&mut self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(corpus) = config_file.corpus {
            if let Some(path) = corpus.path {
                result.corpus_dir = Some(PathBuf::from(path));
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if let Some(endpoint) = llm.endpoint {
                result.endpoint = Some(endpoint);
            }
            if let Some(api_key_env) = llm.api_key_env {
                if let Ok(key) = std::env::var(&api_key_env) {
                    result.api_key = Some(key);
                }
            }
        }

        if let Some(embedding) = config_file.embedding {
            if let Some(provider) = embedding.provider {
                result.embedding_provider = provider;
            }
            if let Some(model) = embedding.model {
                result.embedding_model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                result.embedding_dimensions = dimensions;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// This method merges command-line flags with the loaded configuration,
    /// giving precedence to CLI flags over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        corpus_dir: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(corpus_dir) = corpus_dir {
            self.corpus_dir = Some(corpus_dir);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .mesa directory.
    pub fn mesa_dir(&self) -> PathBuf {
        self.workspace.join(".mesa")
    }

    /// Path of the persisted search index.
    pub fn index_path(&self) -> PathBuf {
        self.mesa_dir().join("index.db")
    }

    /// Path of the unresolved-questions log.
    pub fn unresolved_path(&self) -> PathBuf {
        self.mesa_dir().join("unresolved.jsonl")
    }

    /// Path of the pipeline configuration file.
    pub fn rag_config_path(&self) -> PathBuf {
        self.mesa_dir().join("rag.yaml")
    }

    /// Resolved corpus directory (explicit setting or `<workspace>/docs`).
    pub fn resolved_corpus_dir(&self) -> PathBuf {
        self.corpus_dir
            .clone()
            .unwrap_or_else(|| self.workspace.join("docs"))
    }

    /// Ensure the .mesa directory exists.
    pub fn ensure_mesa_dir(&self) -> AppResult<()> {
        let mesa_dir = self.mesa_dir();
        if !mesa_dir.exists() {
            std::fs::create_dir_all(&mesa_dir)
                .map_err(|e| AppError::Config(format!("Failed to create .mesa directory: {}", e)))?;
        }
        Ok(())
    }

    /// Validate configuration for the active providers.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "openai", "openrouter"];
        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        let known_embedding_providers = ["trigram", "ollama"];
        if !known_embedding_providers.contains(&self.embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding_provider,
                known_embedding_providers.join(", ")
            )));
        }

        // Hosted providers need a key; Ollama does not.
        if matches!(self.provider.as_str(), "openai" | "openrouter") && self.api_key.is_none() {
            return Err(AppError::Config(format!(
                "Provider {} requires an API key (MESA_API_KEY or apiKeyEnv in config.yaml)",
                self.provider
            )));
        }

        if self.embedding_dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.embedding_provider, "trigram");
        assert_eq!(config.embedding_dimensions, 384);
        assert!(!config.verbose);
        assert!(!config.no_color);
    }

    #[test]
    fn test_mesa_dir() {
        let config = AppConfig::default();
        let mesa_dir = config.mesa_dir();
        assert!(mesa_dir.ends_with(".mesa"));
        assert!(config.index_path().ends_with(".mesa/index.db"));
    }

    #[test]
    fn test_resolved_corpus_dir_default() {
        let config = AppConfig::default();
        assert!(config.resolved_corpus_dir().ends_with("docs"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some(PathBuf::from("/tmp/corpus")),
            Some("openrouter".to_string()),
            Some("mistralai/mixtral-8x7b-instruct".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openrouter");
        assert_eq!(overridden.model, "mistralai/mixtral-8x7b-instruct");
        assert_eq!(overridden.corpus_dir, Some(PathBuf::from("/tmp/corpus")));
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_hosted_requires_key() {
        let mut config = AppConfig::default();
        config.provider = "openrouter".to_string();
        assert!(config.validate().is_err());

        config.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "llm:\n  provider: openrouter\n  model: test-model\nembedding:\n  provider: trigram\n  dimensions: 128\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        let merged = config.merge_yaml(&path).unwrap();
        assert_eq!(merged.provider, "openrouter");
        assert_eq!(merged.model, "test-model");
        assert_eq!(merged.embedding_dimensions, 128);
        assert_eq!(merged.log_level, Some("debug".to_string()));
    }
}
