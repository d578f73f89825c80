//! triage-llm - ENT call triage backed by a local Ollama model.
//!
//! # Overview
//!
//! Prompts are sent through a [`ModelClient`] that retries with exponential
//! backoff and repairs near-JSON completions into [`serde_json::Value`]s.
//! The [`TriageService`] builds the interview, summary, ranking, and
//! assessment prompts on top of it, and memoizes assessments in a
//! [`ResultCache`].

pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod triage;

// Re-export commonly used types
pub use cache::{CacheStore, MemoryStore, ResultCache};
pub use config::{Models, Settings};
pub use error::{CacheError, ConfigError, InvocationError, RepairError, TriageError};
pub use llm::{
    GenerationBackend, InvocationRequest, InvocationResult, ModelClient, OllamaBackend,
    RetryPolicy, repair_json,
};
pub use triage::{
    CaseSummary, ChatTurn, RankedCase, SummaryItem, TriageAssessment, TriageChatState,
    TriageOutcome, TriageService,
};
