//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use triage_llm::{MemoryStore, RetryPolicy, Settings, TriageService};

/// Path of the Ollama generation endpoint.
pub const GENERATE_PATH: &str = "/api/generate";

/// Retry policy with millisecond waits so tests run quickly.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_intervals(Duration::from_millis(10), Duration::from_millis(20))
}

/// Settings pointing at a mock server.
pub fn settings_for(server: &MockServer) -> Settings {
    Settings {
        base_url: server.uri(),
        retry: fast_retry(3),
        request_timeout: Duration::from_secs(5),
        ..Settings::default()
    }
}

/// Triage service against a mock server, plus the store behind its cache.
pub fn service_for(server: &MockServer) -> (TriageService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = TriageService::from_settings(&settings_for(server), store.clone())
        .expect("Mock settings should be valid");
    (service, store)
}

/// Ollama's non-streaming response envelope around `completion`.
pub fn generate_body(completion: &str) -> Value {
    json!({
        "model": "llama3.1",
        "created_at": "2024-05-01T12:00:00Z",
        "response": completion,
        "done": true
    })
}

/// A 200 response carrying `completion`.
pub fn completion(completion: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(generate_body(completion))
}

/// Matcher for POSTs to the generation endpoint.
pub fn generate_request() -> MockBuilder {
    Mock::given(method("POST")).and(path(GENERATE_PATH))
}
