//! Error types for the learning layer.

use reasoningbank_core::{BankError, GraphError, LlmError};
use reasoningbank_state::StoreError;

/// Errors produced by judge, extract and pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum LearnError {
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed {stage} output: {message}")]
    Malformed { stage: &'static str, message: String },

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("core error: {0}")]
    Core(#[from] BankError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for learning operations.
pub type LearnResult<T> = std::result::Result<T, LearnError>;
