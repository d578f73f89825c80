//! Triage operations over the model client and result cache.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, ResultCache};
use crate::config::{Models, Settings};
use crate::error::{ConfigError, TriageError};
use crate::llm::{GenerationBackend, InvocationRequest, InvocationResult, ModelClient, OllamaBackend};

use super::prompts;
use super::types::{
    CaseSummary, ChatTurn, RankedCase, SummaryItem, TriageAssessment, TriageChatState,
    TriageOutcome,
};

/// Output-format hint for prompts that must produce a JSON object.
const JSON_FORMAT: &str = "json";

/// ENT triage service.
pub struct TriageService<B = OllamaBackend> {
    client: ModelClient<B>,
    cache: ResultCache,
    models: Models,
}

impl TriageService<OllamaBackend> {
    /// Build a service for the configured Ollama server, caching assessments
    /// in `store`.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn CacheStore>,
    ) -> Result<Self, ConfigError> {
        let client = ModelClient::from_settings(settings)?;
        let cache = ResultCache::new(store, settings.cache_ttl);
        Ok(Self::new(client, cache, settings.models.clone()))
    }
}

impl<B: GenerationBackend> TriageService<B> {
    pub fn new(client: ModelClient<B>, cache: ResultCache, models: Models) -> Self {
        Self {
            client,
            cache,
            models,
        }
    }

    /// Static caller-verification questions.
    pub fn verification_questions(&self) -> &'static [&'static str] {
        prompts::verification_questions()
    }

    /// Advance the structured interview by one turn.
    pub async fn chat(
        &self,
        conversation: &[ChatTurn],
    ) -> Result<TriageOutcome<TriageChatState>, TriageError> {
        let prompt = prompts::build_chat_prompt(conversation);
        let request = InvocationRequest::new(prompt, &self.models.chat).with_format(JSON_FORMAT);
        let result = self.client.invoke(&request).await?;
        Ok(decode_outcome(result, "chat"))
    }

    /// Summarize a finished call transcript.
    pub async fn summarize(
        &self,
        transcript: &str,
    ) -> Result<TriageOutcome<CaseSummary>, TriageError> {
        let prompt = prompts::build_summarization_prompt(transcript);
        let request =
            InvocationRequest::new(prompt, &self.models.summary).with_format(JSON_FORMAT);
        let result = self.client.invoke(&request).await?;
        Ok(decode_outcome(result, "summary"))
    }

    /// Order cases from most to least urgent.
    ///
    /// Returns [`TriageError::NothingToRank`] without calling the model when
    /// `summaries` is empty.
    pub async fn rank(
        &self,
        summaries: &[SummaryItem],
    ) -> Result<TriageOutcome<Vec<RankedCase>>, TriageError> {
        if summaries.is_empty() {
            return Err(TriageError::NothingToRank);
        }

        // No format hint: the ranking is a JSON array.
        let prompt = prompts::build_ranking_prompt(summaries);
        let request = InvocationRequest::new(prompt, &self.models.rank);
        let result = self.client.invoke(&request).await?;

        let outcome: TriageOutcome<Vec<RankedCase>> = decode_outcome(result, "rank");
        Ok(match outcome {
            TriageOutcome::Parsed(mut ranked) => {
                ranked.sort_by_key(|case| case.rank);
                TriageOutcome::Parsed(ranked)
            }
            other => other,
        })
    }

    /// Assess a call transcript, serving repeated `(call_text, context)`
    /// pairs from the cache.
    ///
    /// Unlike the other operations, an unparseable completion is an error
    /// here, and is never cached.
    pub async fn assess(
        &self,
        call_text: &str,
        patient_context: Option<&Value>,
    ) -> Result<TriageAssessment, TriageError> {
        let context = patient_context
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let key = self.cache.key(call_text, &context);

        if let Some(cached) = self.cache.get(&key).await {
            match serde_json::from_value::<TriageAssessment>(cached) {
                Ok(assessment) => {
                    debug!(key, "Serving assessment from cache");
                    return Ok(assessment);
                }
                Err(e) => {
                    warn!(key, "Cached assessment has unexpected shape, discarding: {}", e);
                    self.cache.evict(&key).await;
                }
            }
        }

        let prompt = prompts::build_assessment_prompt(call_text, &context.to_string());
        let request =
            InvocationRequest::new(prompt, &self.models.assessment).with_format(JSON_FORMAT);
        let result = self.client.invoke(&request).await?;

        info!(
            model = request.model(),
            latency_ms = result.latency().as_millis() as u64,
            attempts = result.attempts(),
            parse_success = result.parse_success(),
            "Assessment completed"
        );

        let raw = result.raw().to_string();
        let payload = result
            .into_payload()
            .ok_or(TriageError::Unparsed { raw })?;
        let assessment: TriageAssessment =
            serde_json::from_value(payload).map_err(TriageError::UnexpectedShape)?;

        let normalized = serde_json::to_value(&assessment).map_err(TriageError::SerializationFailed)?;
        if let Err(e) = self.cache.put(&key, &normalized).await {
            warn!(key, "Failed to cache assessment: {}", e);
        }

        Ok(assessment)
    }
}

/// Convert an invocation result into a typed outcome. A payload with the
/// wrong shape is passed through as JSON; only a missing payload degrades.
fn decode_outcome<T: DeserializeOwned>(result: InvocationResult, task: &str) -> TriageOutcome<T> {
    let raw = result.raw().to_string();
    let Some(payload) = result.into_payload() else {
        warn!(task, "Model output could not be parsed, returning raw text");
        return TriageOutcome::Degraded { raw };
    };

    match T::deserialize(&payload) {
        Ok(value) => TriageOutcome::Parsed(value),
        Err(e) => {
            warn!(task, "Model output has unexpected shape, returning it as JSON: {}", e);
            TriageOutcome::Unstructured(payload)
        }
    }
}
