//! Turn orchestrator: one linear pass per user message.
//!
//! Start -> Business-Analyst (formulate) -> Data-Analyst (analyze)
//! -> Business-Analyst (explain) -> End
//!
//! Every turn is recorded in conversation memory, including failed ones, so
//! the parameters a user stated are never lost for the next question.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info};

use smartito_core::config::{AnalystConfig, SmartitoConfig};
use smartito_core::types::ParameterSet;
use smartito_llm::LlmCapability;
use smartito_warehouse::Warehouse;

use crate::business_analyst::BusinessAnalyst;
use crate::context::ConversationMemory;
use crate::data_analyst::DataAnalyst;
use crate::error::ChatError;
use crate::parser::detect_language;
use crate::response;
use crate::state_machine::advance;
use crate::types::{
    Session, SessionSummary, Stage, Turn, TurnOutcome, TurnStatus, UnanswerableReason,
};

/// Text rendering of the turn workflow, shown by the CLI `diagram` command.
pub const WORKFLOW_DIAGRAM: &str = "\
  user message
       |
       v
  [start]
       |
       v
  [formulating]  Business Analyst
       |         extract parameters, merge over conversation memory,
       |         interpret the question
       v
  [analyzing]    Data Analyst
       |         run_sql -> safety gate -> warehouse
       |         up to 3 query attempts, schema lookups are free,
       |         collaborator failures retried once
       v
  [explaining]   Business Analyst
       |         rows -> business answer (concise or detailed)
       |         no rows / unanswerable -> fixed honest template
       v
  [end]          turn recorded in memory
";

// =============================================================================
// Clock
// =============================================================================

/// Source of the reference time for date resolution.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Noon UTC on the given day.
    pub fn on(day: NaiveDate) -> Self {
        Self(
            day.and_hms_opt(12, 0, 0)
                .map(|noon| noon.and_utc())
                .unwrap_or_else(Utc::now),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    business: BusinessAnalyst,
    data: DataAnalyst,
    memory: ConversationMemory,
    session: Session,
    clock: Box<dyn Clock>,
    config: AnalystConfig,
}

impl Orchestrator {
    pub fn new(business: BusinessAnalyst, data: DataAnalyst, config: AnalystConfig) -> Self {
        Self {
            business,
            data,
            memory: ConversationMemory::new(),
            session: Session::new(Utc::now()),
            clock: Box::new(SystemClock),
            config,
        }
    }

    /// Wire both roles from configuration. Each role gets its own capability.
    pub fn from_config(
        config: &SmartitoConfig,
        business_llm: Arc<dyn LlmCapability>,
        data_llm: Arc<dyn LlmCapability>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        let business = BusinessAnalyst::new(business_llm, &config.markets);
        let data = DataAnalyst::new(data_llm, warehouse, &config.warehouse.table, &config.analyst);
        Self::new(business, data, config.analyst.clone())
    }

    /// Replace the clock. The session start time follows the new clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.session.started_at = clock.now();
        self.clock = Box::new(clock);
        self
    }

    /// Process one user message.
    ///
    /// Only input validation errors are returned; any failure inside the
    /// turn becomes an internal-error answer on a recorded, failed turn.
    pub async fn handle_turn(&mut self, text: &str) -> Result<TurnOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }

        let now = self.clock.now();
        let today = now.date_naive();
        let index = self.memory.len();
        let session_id = self.session.id;
        let snapshot = self.memory.snapshot();
        let context = self.memory.context_lines(self.config.context_turns);

        let mut turn = Turn {
            index,
            user_text: text.to_string(),
            extracted: self.business.extract(text, today),
            business_request: None,
            technical_query: None,
            technical_result: None,
            final_answer: String::new(),
            status: TurnStatus::Completed,
            timestamp: now,
        };

        match self.run_stages(&mut turn, &snapshot, &context, today).await {
            Ok(answer) => turn.final_answer = answer,
            Err(e) => {
                error!(turn = index, session_id = %session_id, error = %e, "Turn failed");
                turn.final_answer =
                    response::unanswerable(&UnanswerableReason::InternalError, detect_language(text));
                turn.status = TurnStatus::Failed;
            }
        }

        let outcome_answer = turn.final_answer.clone();
        let status = turn.status;
        self.memory.record(turn);
        self.session.turn_count += 1;

        info!(turn = index, session_id = %session_id, status = %status, "Turn completed");

        Ok(TurnOutcome {
            final_answer: outcome_answer,
            turn_index: index,
            status,
            parameters: self.memory.snapshot(),
        })
    }

    async fn run_stages(
        &self,
        turn: &mut Turn,
        snapshot: &ParameterSet,
        context: &[String],
        today: NaiveDate,
    ) -> Result<String, ChatError> {
        let mut stage = Stage::Start;

        advance(&mut stage, Stage::Formulating)?;
        debug!(turn = turn.index, stage = %stage, "Stage entered");
        let request = self
            .business
            .formulate(&turn.user_text, snapshot, context, today)
            .await?;
        turn.extracted = request.extracted.clone();
        turn.business_request = Some(request.clone());

        advance(&mut stage, Stage::Analyzing)?;
        debug!(turn = turn.index, stage = %stage, "Stage entered");
        let result = self.data.analyze(&request, context, today).await?;
        turn.technical_query = result.query().map(str::to_string);
        turn.technical_result = Some(result.clone());

        advance(&mut stage, Stage::Explaining)?;
        debug!(turn = turn.index, stage = %stage, "Stage entered");
        let answer = self.business.explain(&result, &turn.user_text, context).await?;

        advance(&mut stage, Stage::End)?;
        debug!(turn = turn.index, stage = %stage, "Stage entered");
        Ok(answer)
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_summary(&self) -> SessionSummary {
        let failed = self
            .memory
            .history()
            .iter()
            .filter(|t| t.status == TurnStatus::Failed)
            .count();
        SessionSummary {
            id: self.session.id,
            started_at: self.session.started_at,
            turn_count: self.session.turn_count,
            completed: self.session.turn_count - failed,
            failed,
            parameters: self.memory.snapshot(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
