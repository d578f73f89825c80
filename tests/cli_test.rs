//! End-to-end tests for the subcommands that need no model server.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::tempdir;

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_triage-llm"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to run triage-llm")
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("Failed to write fixture");
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_verify_prints_questions() {
    let output = run(&["verify"]);
    assert!(output.status.success());

    let body = stdout_json(&output);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    assert_eq!(questions[1], "What is your date of birth?");
}

#[test]
fn test_repair_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("completion.txt");
    write_file(&input, "Result:\n```json\n{'urgency_score': 5, 'red_flags': ['stridor',],}\n```");

    let output = run(&["repair", input.to_str().unwrap()]);
    assert!(output.status.success());

    let body = stdout_json(&output);
    assert_eq!(body["extracted"], json!(true));
    assert_eq!(body["value"], json!({"urgency_score": 5, "red_flags": ["stridor"]}));
}

#[test]
fn test_repair_rejects_prose() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("completion.txt");
    write_file(&input, "No JSON here, sorry.");

    let output = run(&["repair", input.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not repairable JSON"), "stderr: {stderr}");
}

#[test]
fn test_missing_input_file_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.txt");

    let output = run(&["repair", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read"), "stderr: {stderr}");
}

#[test]
fn test_chat_rejects_bad_turn() {
    let output = run(&["chat", "--message", "hi", "--turn", "doctor:hello"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown role"), "stderr: {stderr}");
}

#[test]
fn test_assess_help_explains_cache_scope() {
    let output = run(&["assess", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("single run only"), "stdout: {stdout}");
}
