//! Shared types for the analyst pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use smartito_core::types::ParameterSet;
use smartito_warehouse::Row;

// =============================================================================
// Enums
// =============================================================================

/// Language of the user's message, used for the fixed answer templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Spanish,
    English,
}

/// Metric the question is mainly about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFocus {
    ConversionRate,
    Traffic,
    FlightPageLoads,
    PaymentConfirmations,
    CompletionTime,
    General,
}

impl fmt::Display for MetricFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricFocus::ConversionRate => {
                "conversion rate (payment_confirmation_loaded / traffic)"
            }
            MetricFocus::Traffic => "traffic",
            MetricFocus::FlightPageLoads => "flight page loads (flight_dom_loaded_flight)",
            MetricFocus::PaymentConfirmations => "payment confirmations",
            MetricFocus::CompletionTime => "median completion time",
            MetricFocus::General => "general funnel performance",
        };
        f.write_str(s)
    }
}

/// Final status of a recorded turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnStatus::Completed => write!(f, "completed"),
            TurnStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Stages of one turn through the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Formulating,
    Analyzing,
    Explaining,
    End,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Start => write!(f, "start"),
            Stage::Formulating => write!(f, "formulating"),
            Stage::Analyzing => write!(f, "analyzing"),
            Stage::Explaining => write!(f, "explaining"),
            Stage::End => write!(f, "end"),
        }
    }
}

/// Data-Analyst states within one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystState {
    AwaitingQuery,
    Validating,
    Executing,
    Reformulating,
    Summarizing,
    Done,
}

impl fmt::Display for AnalystState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalystState::AwaitingQuery => write!(f, "awaiting_query"),
            AnalystState::Validating => write!(f, "validating"),
            AnalystState::Executing => write!(f, "executing"),
            AnalystState::Reformulating => write!(f, "reformulating"),
            AnalystState::Summarizing => write!(f, "summarizing"),
            AnalystState::Done => write!(f, "done"),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Why the system declined to answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnanswerableReason {
    /// Every proposed query was rejected by the safety gate.
    UnsafeQuery,
    /// The model never proposed a query.
    NoQuery,
    /// A collaborator failed twice.
    ExecutionError { detail: String },
    /// The requested period lies entirely in the future.
    DataNotAvailable,
    /// An unexpected failure inside the turn.
    InternalError,
}

impl UnanswerableReason {
    /// Stable kebab-case code shown in answers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            UnanswerableReason::UnsafeQuery => "unsafe-query",
            UnanswerableReason::NoQuery => "no-query",
            UnanswerableReason::ExecutionError { .. } => "execution-error",
            UnanswerableReason::DataNotAvailable => "data-not-available",
            UnanswerableReason::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for UnanswerableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Grounded numbers extracted from a result set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Finding {
    pub columns: Vec<String>,
    /// Rows with ratio columns normalized to 4 decimal places.
    pub rows: Vec<Row>,
    /// Overall `payment_confirmation_loaded / traffic`, when both are present.
    pub conversion_rate: Option<f64>,
    /// Ratio columns whose integer-truncated values were recomputed.
    pub corrected_columns: Vec<String>,
}

/// Outcome of one Data-Analyst invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TechnicalResult {
    Rows {
        query: String,
        finding: Finding,
        /// The requested range extends past today.
        partial: bool,
        narrative: Option<String>,
    },
    EmptyResult {
        query: String,
        partial: bool,
    },
    Unanswerable(UnanswerableReason),
}

impl TechnicalResult {
    /// The executed query, if one ran.
    pub fn query(&self) -> Option<&str> {
        match self {
            TechnicalResult::Rows { query, .. } | TechnicalResult::EmptyResult { query, .. } => {
                Some(query)
            }
            TechnicalResult::Unanswerable(_) => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        match self {
            TechnicalResult::Rows { partial, .. } | TechnicalResult::EmptyResult { partial, .. } => {
                *partial
            }
            TechnicalResult::Unanswerable(_) => false,
        }
    }
}

// =============================================================================
// Requests, turns, sessions
// =============================================================================

/// What the Business-Analyst hands to the Data-Analyst.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusinessRequest {
    pub question: String,
    pub metric_focus: MetricFocus,
    /// Parameters found in this message alone.
    pub extracted: ParameterSet,
    /// Parameters after merging over the conversation so far.
    pub resolved: ParameterSet,
    pub wants_detail: bool,
    pub language: Language,
    /// The model's reading of the question and the assumptions it makes.
    pub interpretation: String,
}

/// One user question through to one final answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Turn {
    pub index: usize,
    pub user_text: String,
    pub extracted: ParameterSet,
    pub business_request: Option<BusinessRequest>,
    pub technical_query: Option<String>,
    pub technical_result: Option<TechnicalResult>,
    pub final_answer: String,
    pub status: TurnStatus,
    pub timestamp: DateTime<Utc>,
}

/// What the front-end receives after a turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub final_answer: String,
    pub turn_index: usize,
    pub status: TurnStatus,
    pub parameters: ParameterSet,
}

/// Metadata for an interactive session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub turn_count: usize,
}

impl Session {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            turn_count: 0,
        }
    }
}

/// Aggregate view of a session for the front-end.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub turn_count: usize,
    pub completed: usize,
    pub failed: usize,
    /// Parameters a follow-up question would inherit.
    pub parameters: ParameterSet,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {}", self.id)?;
        writeln!(f, "Started: {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(
            f,
            "Turns: {} ({} completed, {} failed)",
            self.turn_count, self.completed, self.failed
        )?;
        write!(f, "Context: {}", self.parameters.describe())
    }
}
