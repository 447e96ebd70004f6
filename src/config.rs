//! Runtime configuration for the copyforge service.
//!
//! All collaborator endpoints and pipeline limits are read from the
//! environment, validated once at startup, and passed down by value.

use std::path::PathBuf;

use thiserror::Error;

/// Default capacity of the pipeline admission gate.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Names of the four retrieval corpora, resolvable to collection names.
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Collection holding copy structure templates.
    pub templates: String,
    /// Collection holding tone/voice guidelines.
    pub tones: String,
    /// Collection holding cross-domain supporting evidence.
    pub cross_evidence: String,
    /// Collection holding secondary supporting evidence.
    pub secondary_evidence: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            templates: "templates".to_string(),
            tones: "tones".to_string(),
            cross_evidence: "cross_evidence".to_string(),
            secondary_evidence: "secondary_evidence".to_string(),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    // LLM settings
    /// Base URL of the chat-completions API.
    pub llm_api_base: String,
    /// API key for the chat-completions API.
    pub llm_api_key: String,
    /// Model identifier used for all generation stages.
    pub llm_model: String,

    // Embedding settings
    /// Base URL of the embeddings API.
    pub embedding_api_base: String,
    /// Embedding model identifier.
    pub embedding_model: String,

    // Retrieval settings
    /// Base URL of the Qdrant instance.
    pub qdrant_url: String,
    /// Optional Qdrant API key.
    pub qdrant_api_key: Option<String>,
    /// Corpus-to-collection mapping.
    pub corpora: CorpusConfig,

    // Scheduler settings
    /// Root directory for per-job output artifacts.
    pub output_dir: PathBuf,
    /// Maximum number of concurrently executing pipelines.
    pub max_concurrency: usize,
}

impl Settings {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LLM_API_BASE`: chat-completions base URL (required)
    /// - `LLM_API_KEY`: chat-completions API key (required)
    /// - `LLM_MODEL`: generation model (required)
    /// - `EMBEDDING_API_BASE`: embeddings base URL (required)
    /// - `EMBEDDING_MODEL`: embedding model (default: bge-m3)
    /// - `QDRANT_URL`: Qdrant base URL (required)
    /// - `QDRANT_API_KEY`: Qdrant API key (optional)
    /// - `COPYFORGE_OUTPUT_DIR`: artifact root (default: ./outputs)
    /// - `COPYFORGE_MAX_CONCURRENCY`: admission gate capacity (default: 8)
    /// - `COPYFORGE_TEMPLATES_COLLECTION` and friends: corpus collection
    ///   name overrides
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or have
    /// invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut corpora = CorpusConfig::default();
        if let Ok(val) = std::env::var("COPYFORGE_TEMPLATES_COLLECTION") {
            corpora.templates = val;
        }
        if let Ok(val) = std::env::var("COPYFORGE_TONES_COLLECTION") {
            corpora.tones = val;
        }
        if let Ok(val) = std::env::var("COPYFORGE_CROSS_EVIDENCE_COLLECTION") {
            corpora.cross_evidence = val;
        }
        if let Ok(val) = std::env::var("COPYFORGE_SECONDARY_EVIDENCE_COLLECTION") {
            corpora.secondary_evidence = val;
        }

        let max_concurrency = match std::env::var("COPYFORGE_MAX_CONCURRENCY") {
            Ok(val) => parse_env_value(&val, "COPYFORGE_MAX_CONCURRENCY")?,
            Err(_) => DEFAULT_MAX_CONCURRENCY,
        };

        let output_dir = std::env::var("COPYFORGE_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./outputs"));

        let settings = Self {
            llm_api_base: require_env("LLM_API_BASE")?.trim_end_matches('/').to_string(),
            llm_api_key: require_env("LLM_API_KEY")?,
            llm_model: require_env("LLM_MODEL")?,
            embedding_api_base: require_env("EMBEDDING_API_BASE")?
                .trim_end_matches('/')
                .to_string(),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "bge-m3".to_string()),
            qdrant_url: require_env("QDRANT_URL")?.trim_end_matches('/').to_string(),
            qdrant_api_key: std::env::var("QDRANT_API_KEY").ok(),
            corpora,
            output_dir,
            max_concurrency,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.llm_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm_model cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("templates", &self.corpora.templates),
            ("tones", &self.corpora.tones),
            ("cross_evidence", &self.corpora.cross_evidence),
            ("secondary_evidence", &self.corpora.secondary_evidence),
        ] {
            if value.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "corpus collection '{}' cannot be empty",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Reads a required environment variable.
fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            llm_api_base: "http://localhost:4000".to_string(),
            llm_api_key: "key".to_string(),
            llm_model: "deepseek-chat".to_string(),
            embedding_api_base: "http://localhost:8080".to_string(),
            embedding_model: "bge-m3".to_string(),
            qdrant_url: "http://localhost:6333".to_string(),
            qdrant_api_key: None,
            corpora: CorpusConfig::default(),
            output_dir: PathBuf::from("./outputs"),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(test_settings().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut settings = test_settings();
        settings.max_concurrency = 0;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_validate_empty_collection() {
        let mut settings = test_settings();
        settings.corpora.tones = String::new();

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("tones"));
    }

    #[test]
    fn test_corpus_config_defaults() {
        let corpora = CorpusConfig::default();
        assert_eq!(corpora.templates, "templates");
        assert_eq!(corpora.tones, "tones");
        assert_eq!(corpora.cross_evidence, "cross_evidence");
        assert_eq!(corpora.secondary_evidence, "secondary_evidence");
    }

    #[test]
    fn test_parse_env_value() {
        let parsed: usize = parse_env_value("12", "KEY").unwrap();
        assert_eq!(parsed, 12);

        let err = parse_env_value::<usize>("twelve", "KEY").unwrap_err();
        assert!(err.to_string().contains("KEY"));
    }
}
