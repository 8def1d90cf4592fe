//! ReasoningBank Core: context construction and bounded execution
//!
//! ## Layer 1 - Context & Execution
//!
//! Focus: turning a loaded RDF graph plus procedural memory into a budgeted
//! prompt, and driving a language-model engine over a bounded tool set.
//!
//! ## Key Components
//!
//! - `GraphAdapter`: oxigraph-backed graphs behind blob-store handles
//! - `layers`: L0 sense card, L1 schema constraints, L2 memory, L3 guide
//! - `ContextBuilder`: fixed-order layer assembly and two-phase L2 retrieval
//! - `tools`: typed tool registry, the `BankTools` adapter, instrumented `ToolBox`
//! - `ExecutionRunner`: context → engine loop → `RunResult`, with iteration
//!   and call caps and per-run leakage metrics
//! - `artifact`: digest-verified run persistence

pub mod artifact;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod graph;
pub mod layers;
pub mod llm;
pub mod metrics;
pub mod obs;
pub mod runner;
pub mod telemetry;
pub mod tools;

pub use artifact::{content_digest, read_run_artifact, write_run_artifact};
pub use config::{
    BankConfig, InjectionMode, LayerCakeConfig, LayerConfig, LearnConfig, LlmConfig,
    RetrievalPolicy, RunnerConfig,
};
pub use context::{AssembledContext, ContextBuilder, LayerReport};
pub use engine::{
    Action, EngineError, ExecutionEngine, ExhaustReason, ReplEngine, StepOutcome, Submission,
    TrajectoryStep,
};
pub use error::{BankError, Result};
pub use graph::{GraphAdapter, GraphError, GraphResult, GraphStats, Row};
pub use layers::schema::SchemaConstraints;
pub use layers::sense::SenseCard;
pub use layers::Layer;
pub use llm::{ChatMessage, CompletionRequest, LanguageModel, LlmError, OpenAiCompatClient, Role};
pub use metrics::{LeakageMetrics, METRICS};
pub use runner::{drive, ExecutionRunner, RunResult};
pub use tools::{
    BankTools, JsonFieldSchema, ToolAdapter, ToolBox, ToolError, ToolGroup, ToolInvocation,
    ToolRegistry, ToolSpec,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
