//! Configuration read from the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 50505;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const GITHUB_MODELS_ENDPOINT: &str = "https://models.inference.ai.azure.com";
pub const LOCAL_API_KEY: &str = "no-key-required";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_ITERATIONS: usize = 6;

/// Which upstream serves the OpenAI-compatible API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAiHost {
    Local,
    Github,
    OpenAi,
}

impl FromStr for OpenAiHost {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "github" => Ok(Self::Github),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("Unknown OPENAI_HOST: {}", other))),
        }
    }
}

impl std::fmt::Display for OpenAiHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenAiHost::Local => write!(f, "local"),
            OpenAiHost::Github => write!(f, "github"),
            OpenAiHost::OpenAi => write!(f, "openai"),
        }
    }
}

/// Resolved base URL and credential for the chat/embedding API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub host: OpenAiHost,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
}

/// Top-level Parley configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// HTTP server port.
    pub port: u16,
    pub host: OpenAiHost,
    pub model: String,
    pub embedding_model: String,
    /// `None` when the selected host has no usable credential or base URL.
    pub endpoint: Option<LlmEndpoint>,
    pub show_multimodal_features: bool,
    pub running_in_production: bool,
    /// Plain-text document set backing the movie search tool.
    pub documents_path: Option<PathBuf>,
    pub temperature: f64,
    pub max_iterations: usize,
}

impl ParleyConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let host = match var("OPENAI_HOST") {
            Some(h) => h.parse()?,
            None => OpenAiHost::Github,
        };
        let model = var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        let embedding_model =
            var("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into());

        let credentials = match host {
            OpenAiHost::Local => var("LOCAL_OPENAI_ENDPOINT")
                .map(|base| (base, LOCAL_API_KEY.to_string())),
            OpenAiHost::Github => var("GITHUB_TOKEN")
                .map(|key| (GITHUB_MODELS_ENDPOINT.to_string(), key)),
            OpenAiHost::OpenAi => var("OPENAI_KEY").or_else(|| var("OPENAI_API_KEY")).map(|key| {
                let base =
                    var("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.into());
                (base, key)
            }),
        };

        let endpoint = credentials.map(|(base_url, api_key)| LlmEndpoint {
            host,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.clone(),
            embedding_model: embedding_model.clone(),
        });

        let show_multimodal_features = var("SHOW_MULTIMODAL_FEATURES")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let temperature = var("PARLEY_TEMPERATURE")
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);
        let max_iterations = var("PARLEY_MAX_ITERATIONS")
            .and_then(|n| n.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        Ok(Self {
            port,
            host,
            model,
            embedding_model,
            endpoint,
            show_multimodal_features,
            running_in_production: var("RUNNING_IN_PRODUCTION").is_some(),
            documents_path: var("PARLEY_DOCUMENTS").map(PathBuf::from),
            temperature,
            max_iterations,
        })
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        if self.running_in_production {
            "warn"
        } else {
            "info"
        }
    }
}
