//! Settings for the model server, retry budget, and result cache.
//!
//! Settings are an explicit struct handed to constructors; nothing reads the
//! environment after [`Settings::from_env`] returns.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;
use crate::llm::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};

const BASE_URL_ENV_VAR: &str = "OLLAMA_BASE_URL";
const HOST_ENV_VAR: &str = "OLLAMA_HOST";
const PORT_ENV_VAR: &str = "OLLAMA_PORT";
const MODEL_ENV_VAR: &str = "OLLAMA_MODEL_NAME";
const CHAT_MODEL_ENV_VAR: &str = "OLLAMA_CHAT_MODEL";
const SUMMARY_MODEL_ENV_VAR: &str = "OLLAMA_SUMMARY_MODEL";
const RANK_MODEL_ENV_VAR: &str = "OLLAMA_RANK_MODEL";
const TIMEOUT_ENV_VAR: &str = "TRIAGE_LLM_TIMEOUT";
const MAX_ATTEMPTS_ENV_VAR: &str = "TRIAGE_LLM_MAX_ATTEMPTS";
const CACHE_TTL_ENV_VAR: &str = "TRIAGE_CACHE_TTL";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: &str = "11434";
const DEFAULT_CHAT_MODEL: &str = "llama3.1";
const DEFAULT_SUMMARY_MODEL: &str = "mistral";
const DEFAULT_RANK_MODEL: &str = "llama3.1";

/// Default per-request timeout (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default cache TTL (1 hour).
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Model names per triage task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Models {
    pub assessment: String,
    pub chat: String,
    pub summary: String,
    pub rank: String,
}

impl Default for Models {
    fn default() -> Self {
        Self {
            assessment: DEFAULT_CHAT_MODEL.to_string(),
            chat: DEFAULT_CHAT_MODEL.to_string(),
            summary: DEFAULT_SUMMARY_MODEL.to_string(),
            rank: DEFAULT_RANK_MODEL.to_string(),
        }
    }
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the Ollama server, without the `/api/generate` path.
    pub base_url: String,
    pub models: Models,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: format!("http://{DEFAULT_HOST}:{DEFAULT_PORT}"),
            models: Models::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl Settings {
    /// Load a `.env` file if one exists, then read settings from the
    /// environment.
    pub fn load() -> Self {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            warn!("Failed to load .env file: {}", e);
        }
        Self::from_env()
    }

    /// Read settings from the process environment.
    ///
    /// `OLLAMA_BASE_URL` wins over `OLLAMA_HOST`/`OLLAMA_PORT`. Invalid
    /// numeric values log a warning and fall back to the defaults.
    pub fn from_env() -> Self {
        let base_url = non_empty_var(BASE_URL_ENV_VAR).unwrap_or_else(|| {
            let host = non_empty_var(HOST_ENV_VAR).unwrap_or_else(|| DEFAULT_HOST.to_string());
            let port = non_empty_var(PORT_ENV_VAR).unwrap_or_else(|| DEFAULT_PORT.to_string());
            format!("http://{host}:{port}")
        });

        let chat = non_empty_var(CHAT_MODEL_ENV_VAR).unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let models = Models {
            assessment: non_empty_var(MODEL_ENV_VAR).unwrap_or_else(|| chat.clone()),
            summary: non_empty_var(SUMMARY_MODEL_ENV_VAR)
                .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
            rank: non_empty_var(RANK_MODEL_ENV_VAR).unwrap_or_else(|| DEFAULT_RANK_MODEL.to_string()),
            chat,
        };

        let retry = RetryPolicy::default().with_max_attempts(parse_var(
            MAX_ATTEMPTS_ENV_VAR,
            DEFAULT_MAX_ATTEMPTS,
        ));

        Self {
            base_url,
            models,
            request_timeout: Duration::from_secs(parse_var(TIMEOUT_ENV_VAR, DEFAULT_TIMEOUT_SECS)),
            retry,
            cache_ttl: Duration::from_secs(parse_var(CACHE_TTL_ENV_VAR, DEFAULT_CACHE_TTL_SECS)),
        }
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        let models = [
            ("assessment", &self.models.assessment),
            ("chat", &self.models.chat),
            ("summary", &self.models.summary),
            ("rank", &self.models.rank),
        ];
        if let Some((task, _)) = models.iter().find(|(_, m)| m.trim().is_empty()) {
            return Err(ConfigError::MissingModel(*task));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Full URL of the generation endpoint.
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a numeric variable, warning and using `default` when it is invalid.
fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(v) if !v.is_empty() => match v.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {} value '{}', using default {}", name, v, default);
                default
            }
        },
        _ => default,
    }
}
