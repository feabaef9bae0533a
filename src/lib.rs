//! SQLPG - SQL Server to PostgreSQL migration assistant
//!
//! This crate provides:
//! - Per-session document store for the uploaded script and derived outputs
//! - Prompt templates for overview, ERD, conversion and verification requests
//! - An OpenAI-compatible completion client with a bearer credential
//! - Markdown and Mermaid rendering of model output
//! - REST API and single-page UI for browser use

pub mod api;
pub mod controller;
pub mod credential;
pub mod prompt;
pub mod provider;
pub mod render;
pub mod session;

pub use controller::{Action, ActionOutcome, Assistant, ControllerError};
pub use provider::{Completion, CompletionClient, LlmProvider, LlmRequest, LlmResponse};
pub use session::{Session, SessionStore};

use std::path::{Path, PathBuf};

/// Configuration for the assistant
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AssistantConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Chat-completion endpoint (OpenAI-compatible)
    #[serde(default = "default_completion_url")]
    pub completion_url: String,

    /// Endpoint returning `{ "token": "..." }` for the bearer credential
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Model name sent with every completion request
    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; kept low for literal code output
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Timeout for a single completion request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bundled script served by "Load sample data"
    #[serde(default = "default_sample_path")]
    pub sample_path: PathBuf,

    /// Sessions untouched for this long are dropped (seconds)
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// How often idle sessions are swept (seconds)
    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,
}

fn default_bind_addr() -> String { "0.0.0.0:8080".to_string() }
fn default_completion_url() -> String {
    "https://llmfoundry.straive.com/openai/v1/chat/completions".to_string()
}
fn default_token_url() -> String { "https://llmfoundry.straive.com/token".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_max_tokens() -> u32 { 2000 }
fn default_temperature() -> f32 { 0.2 }
fn default_request_timeout_secs() -> u64 { 300 }
fn default_sample_path() -> PathBuf { PathBuf::from("assets/Sql_file_v2.sql") }
fn default_session_ttl_secs() -> u64 { 3600 }
fn default_session_sweep_secs() -> u64 { 60 }

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            completion_url: default_completion_url(),
            token_url: default_token_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            sample_path: default_sample_path(),
            session_ttl_secs: default_session_ttl_secs(),
            session_sweep_secs: default_session_sweep_secs(),
        }
    }
}

/// Errors from loading the configuration file
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl AssistantConfig {
    /// Parse a TOML document; absent keys take their defaults
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: display,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_empty_document() {
        let config = AssistantConfig::from_toml("").unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 2000);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.sample_path, PathBuf::from("assets/Sql_file_v2.sql"));
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.session_sweep_secs, 60);
    }

    #[test]
    fn test_partial_override() {
        let config = AssistantConfig::from_toml(
            r#"
            model = "gpt-4o"
            bind_addr = "127.0.0.1:3000"
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.max_tokens, 2000);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = AssistantConfig::from_toml(include_str!("../config.toml")).unwrap();
        assert_eq!(config.request_timeout_secs, 300);
        assert_eq!(config.session_ttl_secs, 3600);
        assert_eq!(config.token_url, "https://llmfoundry.straive.com/token");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AssistantConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_tokens = \"lots\"").unwrap();
        assert!(matches!(
            AssistantConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
