//! Structured payloads exchanged with the triage prompts.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of the triage interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Urgency category used by the interview prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    Moderate,
    High,
    Emergent,
}

// Models are inconsistent about case ("High", "EMERGENT").
impl<'de> Deserialize<'de> for UrgencyLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(UrgencyLevel::Low),
            "moderate" => Ok(UrgencyLevel::Moderate),
            "high" => Ok(UrgencyLevel::High),
            "emergent" => Ok(UrgencyLevel::Emergent),
            _ => Err(de::Error::unknown_variant(
                &s,
                &["low", "moderate", "high", "emergent"],
            )),
        }
    }
}

/// Accept a number or a numeric string such as `"3"`.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText<T> {
        Number(T),
        Text(String),
    }

    match NumberOrText::<T>::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// State of the structured ENT interview after the latest turn.
///
/// Fields stay `None` until the patient has mentioned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageChatState {
    pub next_question: Option<String>,
    pub duration: Option<String>,
    pub severity: Option<String>,
    pub stability: Option<String>,
    pub aggravating_factors: Option<String>,
    pub relieving_factors: Option<String>,
    pub predisposing_factors: Option<String>,
    pub associated_symptoms: Option<String>,
    pub correlating_data: Option<String>,
    pub red_flags_present: bool,
    pub red_flags: Vec<String>,
    pub urgency_level: Option<UrgencyLevel>,
    pub triage_complete: bool,
}

/// Structured summary of a finished call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub primary_symptom: String,
    #[serde(default)]
    pub secondary_symptoms: Vec<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub possible_diagnoses: Vec<String>,
    /// 1 (least urgent) to 5 (most urgent).
    #[serde(deserialize_with = "lenient_number")]
    pub urgency_score: u8,
    pub recommendation: String,
}

/// A case offered for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub id: String,
    pub primary_symptom: String,
    #[serde(deserialize_with = "lenient_number")]
    pub urgency_score: u8,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

/// A case's position in the urgency queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCase {
    pub id: String,
    /// 1 is most urgent.
    #[serde(deserialize_with = "lenient_number")]
    pub rank: u32,
    #[serde(deserialize_with = "lenient_number")]
    pub score: u8,
    #[serde(default)]
    pub explanation: String,
}

/// Triage assessment of a call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub summary: String,
    /// 1 (least urgent) to 5 (most urgent).
    #[serde(deserialize_with = "lenient_number")]
    pub urgency_level: u8,
    pub urgency_label: String,
    pub recommended_action: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What a consumer receives from a triage operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TriageOutcome<T> {
    /// The payload matched the expected structure.
    Parsed(T),
    /// The completion was JSON, but not in the expected structure.
    Unstructured(Value),
    /// The model never produced usable JSON.
    Degraded { raw: String },
}

impl<T> TriageOutcome<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            TriageOutcome::Parsed(value) => Some(value),
            TriageOutcome::Unstructured(_) | TriageOutcome::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, TriageOutcome::Degraded { .. })
    }
}
