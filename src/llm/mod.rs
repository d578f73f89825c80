//! Model invocation, JSON repair, and retry.

pub mod client;
pub mod json;
pub mod retry;

pub use client::{
    GenerationBackend, InvocationRequest, InvocationResult, ModelClient, OllamaBackend,
};
pub use json::{Repaired, Strategy, extract_json, repair, repair_json};
pub use retry::RetryPolicy;
