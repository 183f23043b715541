//! Error types for the analyst pipeline.

use smartito_core::error::SmartitoError;
use smartito_llm::LlmError;
use smartito_warehouse::WarehouseError;

use crate::types::{AnalystState, Stage};

/// Errors from the chat engine.
///
/// Input validation errors reach the front-end. Everything else is caught by
/// the orchestrator and turned into an internal-error answer.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("invalid stage transition: {0} -> {1}")]
    InvalidStage(Stage, Stage),
    #[error("invalid analyst transition: {0} -> {1}")]
    InvalidAnalystState(AnalystState, AnalystState),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SmartitoError> for ChatError {
    fn from(err: SmartitoError) -> Self {
        ChatError::Internal(err.to_string())
    }
}
