//! Model invocation client.
//!
//! Sends a prompt to the Ollama `/api/generate` endpoint, repairs the
//! completion into JSON, and retries the whole request when the transport
//! fails, the completion is empty, or the output cannot be repaired. When the
//! budget runs out on bad output the raw text is returned unparsed so the
//! caller can degrade; when it runs out on a transport failure, that error is
//! returned.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{ConfigError, InvocationError};

use super::json::repair;
use super::retry::{Next, RetryPolicy};

/// One generation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    prompt: String,
    model: String,
    format: Option<String>,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            format: None,
        }
    }

    /// Attach an output-format hint (e.g. `"json"`), passed through to the
    /// model server.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }
}

/// Normalized outcome of an invocation.
///
/// A payload is present exactly when parsing succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    raw: String,
    payload: Option<Value>,
    latency: Duration,
    attempts: u32,
}

impl InvocationResult {
    fn parsed(raw: String, payload: Value, latency: Duration, attempts: u32) -> Self {
        Self {
            raw,
            payload: Some(payload),
            latency,
            attempts,
        }
    }

    fn degraded(raw: String, latency: Duration, attempts: u32) -> Self {
        Self {
            raw,
            payload: None,
            latency,
            attempts,
        }
    }

    /// The completion text exactly as the model returned it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Value> {
        self.payload
    }

    /// Wall-clock time of the attempt that produced this result.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn parse_success(&self) -> bool {
        self.payload.is_some()
    }

    /// Number of model calls made, including the one that produced this result.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Transport to a text-generation endpoint.
///
/// This abstraction allows mocking the model server in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send one request and return the completion text.
    async fn generate(&self, request: &InvocationRequest) -> Result<String, InvocationError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Backend for an Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl OllamaBackend {
    /// `url` is the full generation endpoint, e.g.
    /// `http://localhost:11434/api/generate`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.generate_url(), settings.request_timeout)
    }

    fn map_send_error(&self, e: reqwest::Error) -> InvocationError {
        if e.is_timeout() {
            InvocationError::Timeout(self.timeout.as_secs())
        } else {
            InvocationError::Transport(e)
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, request: &InvocationRequest) -> Result<String, InvocationError> {
        let body = GenerateRequest {
            model: request.model(),
            prompt: request.prompt(),
            stream: false,
            format: request.format(),
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(InvocationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| InvocationError::Decode(format!("{}. Body: {}", e, text)))?;
        Ok(envelope.response)
    }
}

/// Why an attempt did not produce a parsed result.
enum Failure {
    Transport(InvocationError),
    Empty { latency: Duration },
    Malformed { raw: String, latency: Duration },
}

/// Model client with retry and JSON repair.
pub struct ModelClient<B = OllamaBackend> {
    backend: B,
    retry: RetryPolicy,
}

impl ModelClient<OllamaBackend> {
    /// Build a client for the configured Ollama server.
    ///
    /// Fails with a configuration error if the settings are incomplete.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::new(OllamaBackend::from_settings(settings), settings.retry))
    }
}

impl<B: GenerationBackend> ModelClient<B> {
    pub fn new(backend: B, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Invoke the model and normalize its output.
    ///
    /// Transport failures, empty completions, and unrepairable output share
    /// one attempt budget. Configuration errors are returned immediately.
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, InvocationError> {
        if request.model().trim().is_empty() {
            return Err(ConfigError::MissingModel("request").into());
        }

        let mut state = self.retry.start();

        while let Some(attempt) = state.begin() {
            let started = Instant::now();
            let outcome = self.backend.generate(request).await;
            let latency = started.elapsed();

            let failure = match outcome {
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(attempt, model = request.model(), "Model request failed: {}", e);
                    Failure::Transport(e)
                }
                Ok(raw) => {
                    let content = raw.trim();
                    if content.is_empty() {
                        warn!(attempt, model = request.model(), "Model returned an empty completion");
                        Failure::Empty { latency }
                    } else {
                        match repair(content) {
                            Ok(repaired) => {
                                debug!(
                                    attempt,
                                    model = request.model(),
                                    strategy = %repaired.strategy,
                                    latency_ms = latency.as_millis() as u64,
                                    "Model output parsed"
                                );
                                return Ok(InvocationResult::parsed(
                                    raw,
                                    repaired.value,
                                    latency,
                                    attempt,
                                ));
                            }
                            Err(e) => {
                                warn!(attempt, model = request.model(), "Model output unparseable: {}", e);
                                Failure::Malformed { raw, latency }
                            }
                        }
                    }
                }
            };

            match state.fail() {
                Next::Retry(wait) => tokio::time::sleep(wait).await,
                Next::Exhausted => {
                    return match failure {
                        Failure::Transport(e) => Err(e),
                        Failure::Empty { latency } => {
                            Ok(InvocationResult::degraded(String::new(), latency, attempt))
                        }
                        Failure::Malformed { raw, latency } => {
                            Ok(InvocationResult::degraded(raw, latency, attempt))
                        }
                    };
                }
            }
        }

        Err(ConfigError::ZeroAttempts.into())
    }
}
