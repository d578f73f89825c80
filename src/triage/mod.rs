//! ENT triage prompts, payloads, and the service that ties them to the
//! model client.

pub mod prompts;
pub mod service;
pub mod types;

pub use service::TriageService;
pub use types::{
    CaseSummary, ChatTurn, RankedCase, Role, SummaryItem, TriageAssessment, TriageChatState,
    TriageOutcome, UrgencyLevel,
};
