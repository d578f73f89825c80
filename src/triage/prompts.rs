//! Prompt construction for the ENT triage tasks.

use super::types::{ChatTurn, SummaryItem};

/// Line limit for short fields such as symptoms and red flags.
/// Transcripts and conversation turns are never truncated.
const MAX_FIELD_LINES: usize = 5;

/// Questions asked before the AI interview starts. No model call needed.
const VERIFICATION_QUESTIONS: [&str; 5] = [
    "What is your full name?",
    "What is your date of birth?",
    "What is your phone number or email address?",
    "Do you have any known allergies to medications?",
    "Do you have any chronic medical conditions we should be aware of?",
];

const INTERVIEW_INSTRUCTIONS: &str = r#"You are a medical triage assistant specializing in ENT (Ear, Nose, and Throat).
Your goal is to collect structured clinical information to determine urgency.

Ask ONE question at a time, in this order, and wait for the answer before moving on:
1. DURATION: "How long have you had this symptom?"
2. SEVERITY: "Is the pain mild, moderate, or severe?"
3. STABILITY: "Is the symptom getting better, worse, or staying the same?"
4. AGGRAVATING FACTORS: "What makes the symptoms worse?"
5. RELIEVING FACTORS: "What makes the symptoms better?"
6. PREDISPOSING FACTORS: "Do you have diabetes, immune suppression, or other risk factors?"
7. ASSOCIATED SYMPTOMS: "Are there other symptoms that occur with this?"
8. CORRELATING DATA: "Have you had any test results, scans, or found any neck masses?"

RED FLAGS (critical):
- difficulty breathing
- drooling
- inability to swallow
- neck swelling
- spitting up blood
- fever over 102F
- rapid progression

If a red flag is mentioned, stop asking questions, advise urgent evaluation,
and set urgency_level to "emergent".

Always respond with a JSON object with exactly these fields:
{
  "next_question": string | null,
  "duration": string | null,
  "severity": string | null,
  "stability": string | null,
  "aggravating_factors": string | null,
  "relieving_factors": string | null,
  "predisposing_factors": string | null,
  "associated_symptoms": string | null,
  "correlating_data": string | null,
  "red_flags_present": boolean,
  "red_flags": [string],
  "urgency_level": "low" | "moderate" | "high" | "emergent",
  "triage_complete": boolean
}

Only fill fields the patient has mentioned. Never invent answers.
Never write anything outside the JSON object."#;

/// Static intake questions used to verify the caller.
pub fn verification_questions() -> &'static [&'static str] {
    &VERIFICATION_QUESTIONS
}

/// Build the structured-interview prompt from the conversation so far.
pub fn build_chat_prompt(conversation: &[ChatTurn]) -> String {
    let conversation_text = conversation
        .iter()
        .map(|turn| format!("{}: {}", turn.role, neutralize_markdown(&turn.content)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{INTERVIEW_INSTRUCTIONS}\n\nConversation so far:\n{conversation_text}\n\nRespond with JSON only."
    )
}

/// Build the prompt that turns a finished call transcript into a case summary.
pub fn build_summarization_prompt(transcript: &str) -> String {
    let transcript = neutralize_markdown(transcript.trim());

    format!(
        r#"You are an otolaryngology (ENT) triage assistant reviewing the transcript of a
call between a patient and a healthcare provider. Create a concise structured
summary of the patient's ENT complaint for medical staff.

Call transcript:
"{transcript}"

Extract:
- primary_symptom: the main ENT complaint (e.g. "ear pain")
- secondary_symptoms: other symptoms described
- duration: how long the primary symptom has been present
- severity: mild / moderate / severe
- possible_diagnoses: a short list of plausible ENT diagnoses
- urgency_score: integer from 1 (least urgent) to 5 (most urgent)
- recommendation: brief next step (e.g. "schedule non-urgent appointment", "go to emergency room")

Respond only with a JSON object matching this schema:
{{
  "primary_symptom": string,
  "secondary_symptoms": [string],
  "duration": string,
  "severity": string,
  "possible_diagnoses": [string],
  "urgency_score": int,
  "recommendation": string
}}

Do not include any explanation or additional fields. The JSON must be valid."#
    )
}

/// Build the prompt that orders case summaries by urgency.
pub fn build_ranking_prompt(summaries: &[SummaryItem]) -> String {
    let cases_text = summaries
        .iter()
        .map(|case| {
            let red_flags = if case.red_flags.is_empty() {
                "none".to_string()
            } else {
                case.red_flags
                    .iter()
                    .map(|f| sanitize_for_prompt(f, MAX_FIELD_LINES))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "Case {}: primary_symptom='{}', urgency_score={}, red_flags={}",
                sanitize_for_prompt(&case.id, 1),
                sanitize_for_prompt(&case.primary_symptom, MAX_FIELD_LINES),
                case.urgency_score,
                red_flags
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an otolaryngology (ENT) triage assistant asked to order a list of cases
from most urgent to least urgent. Each case has a primary symptom, an estimated
urgency score (1-5), and any identified red flags.

Cases to rank:
{cases_text}

Return a JSON array of objects in descending order of urgency. Each object must contain:
- id: the case identifier
- rank: position in the queue starting from 1 (1 is most urgent)
- score: an updated urgency score (int 1-5)
- explanation: a short reason for the rank

Example:
[
  {{"id": "A", "rank": 1, "score": 5, "explanation": "active bleeding"}},
  {{"id": "B", "rank": 2, "score": 4, "explanation": "severe pain and fever"}}
]

Do not include extra commentary or fields. The JSON array must be valid."#
    )
}

/// Build the assessment prompt for a call transcript plus patient context.
///
/// `patient_context` is embedded as given; callers pass canonical JSON.
pub fn build_assessment_prompt(call_text: &str, patient_context: &str) -> String {
    let call_text = neutralize_markdown(call_text);

    format!(
        r#"You are an ENT (Ear, Nose and Throat) triage assistant. Review the transcript of
a patient's call and produce a structured triage assessment. Always return a JSON
object with these keys:

- summary: concise summary of the patient's symptoms and history
- urgency_level: integer from 1 (least urgent) to 5 (most urgent)
- urgency_label: "low", "medium", "high" or "critical", consistent with urgency_level
- recommended_action: short next step ("home care", "routine appointment",
  "same day appointment", "emergency care")
- notes: any additional notes or flags relevant to the case

If information is missing, make conservative assumptions in favour of patient
safety. Do not include any text outside the JSON.

Call transcript:
{call_text}

Patient context:
{patient_context}

Respond only with JSON."#
    )
}

/// Neutralize markdown that could be read as prompt structure.
pub fn neutralize_markdown(text: &str) -> String {
    text.replace("```", "'''").replace("##", "//")
}

/// [`neutralize_markdown`], then bound the number of lines.
pub fn sanitize_for_prompt(text: &str, max_lines: usize) -> String {
    neutralize_markdown(text)
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}
