//! Error types for triage-llm modules using thiserror.

use thiserror::Error;

/// Errors from JSON repair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepairError {
    /// Every repair strategy failed. `offset` is the zero-based byte offset
    /// where strict parsing of `raw` stopped.
    #[error("Unable to parse or repair JSON at offset {offset}")]
    MalformedOutput { raw: String, offset: usize },
}

impl RepairError {
    /// The original text that could not be repaired.
    pub fn raw(&self) -> &str {
        match self {
            RepairError::MalformedOutput { raw, .. } => raw,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            RepairError::MalformedOutput { offset, .. } => *offset,
        }
    }
}

/// Errors from model invocation.
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("Request to model server failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Model server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model server response could not be decoded: {0}")]
    Decode(String),

    #[error("Model request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid model configuration: {0}")]
    Configuration(#[from] ConfigError),
}

impl InvocationError {
    /// Whether the client may retry after this error.
    ///
    /// Configuration errors are fatal; everything else is a transport-level
    /// failure that a fresh request might not hit.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, InvocationError::Configuration(_))
    }
}

/// Errors from the key-value store behind the result cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors from settings validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OLLAMA_BASE_URL must be configured")]
    MissingEndpoint,

    #[error("Model identifier must not be empty ({0})")]
    MissingModel(&'static str),

    #[error("Attempt budget must be at least 1")]
    ZeroAttempts,
}

/// Errors from the triage layer.
#[derive(Error, Debug)]
pub enum TriageError {
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("Model returned unparseable output after all attempts")]
    Unparsed { raw: String },

    #[error("Model output did not match the expected shape: {0}")]
    UnexpectedShape(#[source] serde_json::Error),

    #[error("At least one case summary is required for ranking")]
    NothingToRank,

    #[error("Failed to serialize prompt data: {0}")]
    SerializationFailed(#[source] serde_json::Error),
}
