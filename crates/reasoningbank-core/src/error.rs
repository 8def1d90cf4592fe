//! Error taxonomy for the context and execution layer.

use reasoningbank_state::StoreError;

use crate::engine::EngineError;
use crate::graph::GraphError;
use crate::llm::LlmError;
use crate::tools::ToolError;

/// Umbrella error for core operations.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, BankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_wraps() {
        let err: BankError = StoreError::HandleNotFound {
            key: "graph_0".into(),
        }
        .into();
        assert!(err.to_string().contains("handle not found: graph_0"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = BankError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_config_error() {
        let err = BankError::Config("max_iterations must be positive".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }
}
