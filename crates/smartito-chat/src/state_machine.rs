//! Validated transitions for the turn and Data-Analyst state machines.
//!
//! Turn stages:
//! Start -> Formulating -> Analyzing -> Explaining -> End
//!
//! Data-Analyst states:
//! AwaitingQuery -> Validating -> Executing -> Summarizing -> Done
//! Validating -> Reformulating -> AwaitingQuery
//! AwaitingQuery -> Reformulating (reply without a query)
//! AwaitingQuery/Executing -> Done (give up, empty result, execution error)

use std::fmt::Display;

use crate::error::ChatError;
use crate::types::{AnalystState, Stage};

/// A state enum with a fixed transition table.
pub trait StateMachine: Copy + Display {
    fn allows(self, to: Self) -> bool;

    fn invalid(from: Self, to: Self) -> ChatError;
}

impl StateMachine for Stage {
    fn allows(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Stage::Start, Stage::Formulating)
                | (Stage::Formulating, Stage::Analyzing)
                | (Stage::Analyzing, Stage::Explaining)
                | (Stage::Explaining, Stage::End)
        )
    }

    fn invalid(from: Self, to: Self) -> ChatError {
        ChatError::InvalidStage(from, to)
    }
}

impl StateMachine for AnalystState {
    fn allows(self, to: Self) -> bool {
        use AnalystState::*;
        matches!(
            (self, to),
            (AwaitingQuery, Validating)
                | (AwaitingQuery, Reformulating)
                | (AwaitingQuery, Done)
                | (Validating, Executing)
                | (Validating, Reformulating)
                | (Reformulating, AwaitingQuery)
                | (Executing, Summarizing)
                | (Executing, Done)
                | (Summarizing, Done)
        )
    }

    fn invalid(from: Self, to: Self) -> ChatError {
        ChatError::InvalidAnalystState(from, to)
    }
}

/// Validate that a transition is allowed.
pub fn validate_transition<S: StateMachine>(from: S, to: S) -> Result<(), ChatError> {
    if from.allows(to) {
        Ok(())
    } else {
        Err(S::invalid(from, to))
    }
}

/// Move `state` to `to` if the transition is allowed.
pub fn advance<S: StateMachine>(state: &mut S, to: S) -> Result<(), ChatError> {
    validate_transition(*state, to)?;
    *state = to;
    Ok(())
}
