//! Integration tests for the model client against a mocked Ollama server.

mod common;

use std::time::Duration;

use serde_json::json;
use triage_llm::error::InvocationError;
use triage_llm::{InvocationRequest, ModelClient, OllamaBackend};
use wiremock::matchers::body_partial_json;
use wiremock::{MockServer, ResponseTemplate};

use common::{GENERATE_PATH, completion, fast_retry, generate_request};

fn client_for(server: &MockServer, max_attempts: u32) -> ModelClient {
    let backend = OllamaBackend::new(
        format!("{}{}", server.uri(), GENERATE_PATH),
        Duration::from_secs(5),
    );
    ModelClient::new(backend, fast_retry(max_attempts))
}

#[tokio::test]
async fn test_request_body_matches_ollama_api() {
    let server = MockServer::start().await;

    generate_request()
        .and(body_partial_json(json!({
            "model": "mistral",
            "prompt": "Summarize this call",
            "stream": false,
            "format": "json"
        })))
        .respond_with(completion(r#"{"primary_symptom": "ear pain"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let request = InvocationRequest::new("Summarize this call", "mistral").with_format("json");
    let result = client.invoke(&request).await.unwrap();

    assert!(result.parse_success());
    assert_eq!(result.payload(), Some(&json!({"primary_symptom": "ear pain"})));
    assert_eq!(result.attempts(), 1);
}

#[tokio::test]
async fn test_malformed_twice_then_valid_makes_three_requests() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(completion("Sure! The patient seems stable."))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    generate_request()
        .respond_with(completion("{'urgency_score': 4, 'red_flags': ['drooling',],}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap();

    assert!(result.parse_success());
    assert_eq!(result.attempts(), 3);
    assert_eq!(
        result.payload(),
        Some(&json!({"urgency_score": 4, "red_flags": ["drooling"]}))
    );
}

#[tokio::test]
async fn test_unrepairable_output_degrades_after_budget() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(completion("I cannot answer that."))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let result = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap();

    assert!(!result.parse_success());
    assert_eq!(result.raw(), "I cannot answer that.");
    assert_eq!(result.attempts(), 2);
}

#[tokio::test]
async fn test_server_error_exhausts_budget() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let err = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap_err();

    match err {
        InvocationError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model not loaded");
        }
        other => panic!("Expected Status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_then_success_recovers() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    generate_request()
        .respond_with(completion("[1, 2]"))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap();
    assert_eq!(result.payload(), Some(&json!([1, 2])));
    assert_eq!(result.attempts(), 2);
}

#[tokio::test]
async fn test_undecodable_envelope_is_decode_error() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    let err = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Decode(_)));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(completion("{}").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(
        format!("{}{}", server.uri(), GENERATE_PATH),
        Duration::from_millis(200),
    );
    let client = ModelClient::new(backend, fast_retry(1));
    let err = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Timeout(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    // Nothing listens on port 1.
    let backend = OllamaBackend::new("http://127.0.0.1:1/api/generate", Duration::from_secs(2));
    let client = ModelClient::new(backend, fast_retry(2));
    let err = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Transport(_)));
}

#[tokio::test]
async fn test_empty_completion_is_retried_then_degrades() {
    let server = MockServer::start().await;

    generate_request()
        .respond_with(completion(""))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let result = client
        .invoke(&InvocationRequest::new("prompt", "llama3.1"))
        .await
        .unwrap();
    assert!(!result.parse_success());
    assert_eq!(result.raw(), "");
}
