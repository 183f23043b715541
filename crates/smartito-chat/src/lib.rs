//! Conversational analyst for the airline funnel table.
//!
//! A Business-Analyst role frames each question, a Data-Analyst role answers
//! it with one validated `SELECT`, and the orchestrator drives both through a
//! fixed per-turn workflow while conversation memory carries parameters from
//! one question to the next.

pub mod business_analyst;
pub mod context;
pub mod data_analyst;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod response;
pub mod state_machine;
pub mod types;

pub use business_analyst::BusinessAnalyst;
pub use context::{merge, ConversationMemory};
pub use data_analyst::DataAnalyst;
pub use error::ChatError;
pub use orchestrator::{Clock, FixedClock, Orchestrator, SystemClock, WORKFLOW_DIAGRAM};
pub use parser::ParameterExtractor;
pub use state_machine::validate_transition;
pub use types::{
    AnalystState, BusinessRequest, Finding, Language, MetricFocus, Session, SessionSummary,
    Stage, TechnicalResult, Turn, TurnOutcome, TurnStatus, UnanswerableReason,
};
