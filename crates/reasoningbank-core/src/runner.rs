//! Execution runner: load → build context → bounded engine loop → result.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{warn, Instrument};
use uuid::Uuid;

use reasoningbank_state::{BlobStore, MemStore};

use crate::config::{BankConfig, RunnerConfig};
use crate::context::{AssembledContext, ContextBuilder};
use crate::engine::{ExecutionEngine, ExhaustReason, ReplEngine, StepOutcome, TrajectoryStep};
use crate::error::Result;
use crate::graph::GraphAdapter;
use crate::llm::LanguageModel;
use crate::metrics::{LeakageMetrics, METRICS};
use crate::obs;
use crate::tools::{BankTools, ToolBox};

/// Outcome of one task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub task: String,
    /// Submitted answer, or the engine's partial text. Never absent.
    pub answer: String,
    /// SPARQL the engine reported using, if any.
    pub query: Option<String>,
    pub converged: bool,
    pub iteration_count: usize,
    #[serde(rename = "leakage_metrics")]
    pub leakage: LeakageMetrics,
    pub trajectory: Vec<TrajectoryStep>,
    /// Rendered context the engine started from.
    pub context: String,
    /// Memory items injected into L2.
    pub memory_ids: Vec<String>,
    /// Set when the loop stopped on a spent budget.
    pub exhausted: Option<ExhaustReason>,
    /// Set when the loop stopped on an engine failure.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Runs tasks against RDF graphs with a language-model engine.
pub struct ExecutionRunner {
    model: Arc<dyn LanguageModel>,
    cfg: BankConfig,
    guide: Option<String>,
}

impl ExecutionRunner {
    pub fn new(model: Arc<dyn LanguageModel>, cfg: BankConfig) -> Self {
        Self {
            model,
            cfg,
            guide: None,
        }
    }

    /// Reference guide packed into L3.
    pub fn with_guide(mut self, text: impl Into<String>) -> Self {
        self.guide = Some(text.into());
        self
    }

    pub fn config(&self) -> &BankConfig {
        &self.cfg
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Load `graph_path` into a fresh blob store and run `task` against it.
    pub async fn run(
        &self,
        task: &str,
        graph_path: impl AsRef<Path>,
        mem: Option<&MemStore>,
    ) -> Result<RunResult> {
        let graph = GraphAdapter::new(Arc::new(BlobStore::new()));
        let handle = graph.load(graph_path)?;
        self.run_loaded(&graph, &handle.key, task, mem).await
    }

    /// Run `task` against a graph that is already loaded.
    pub async fn run_loaded(
        &self,
        graph: &GraphAdapter,
        graph_key: &str,
        task: &str,
        mem: Option<&MemStore>,
    ) -> Result<RunResult> {
        let mut builder = ContextBuilder::new(graph, &self.cfg);
        if let Some(guide) = &self.guide {
            builder = builder.with_guide(guide.clone());
        }
        let context = builder.assemble(graph_key, task, mem)?;
        let registry = builder.tools();

        let mut adapter = BankTools::new(graph, graph_key);
        if let Some(mem) = mem {
            adapter = adapter.with_memory(mem);
        }
        let rendered = context.render();
        let mut engine = ReplEngine::new(
            Arc::clone(&self.model),
            &rendered,
            &registry.render(),
            task,
            self.cfg.runner.max_calls,
        )
        .with_max_tokens(self.cfg.llm.max_tokens);
        let toolbox = ToolBox::new(registry, adapter, self.cfg.runner.large_return_threshold);

        Ok(drive(&mut engine, &toolbox, task, context, &self.cfg.runner).await)
    }
}

/// Step `engine` until it submits, spends a budget, fails, or reaches
/// `max_iterations`. The trajectory never exceeds `max_iterations` steps.
pub async fn drive(
    engine: &mut dyn ExecutionEngine,
    toolbox: &ToolBox<'_>,
    task: &str,
    context: AssembledContext,
    limits: &RunnerConfig,
) -> RunResult {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let clock = Instant::now();
    let rendered = context.render();
    METRICS.inc_runs();
    obs::emit_run_started(&run_id, task, rendered.chars().count());

    let mut trajectory = Vec::new();
    let mut submission = None;
    let mut exhausted = None;
    let mut error = None;

    async {
        while trajectory.len() < limits.max_iterations {
            match engine.step(toolbox).await {
                Ok(StepOutcome::Ongoing(step)) => trajectory.push(step),
                Ok(StepOutcome::Submitted { step, submission: s }) => {
                    trajectory.push(step);
                    submission = Some(s);
                    break;
                }
                Ok(StepOutcome::Exhausted(reason)) => {
                    exhausted = Some(reason);
                    break;
                }
                Err(e) => {
                    warn!(event = "run.engine_error", error = %e);
                    error = Some(e.to_string());
                    break;
                }
            }
        }
    }
    .instrument(obs::run_span(&run_id))
    .await;
    if submission.is_none() && exhausted.is_none() && error.is_none() {
        exhausted = Some(ExhaustReason::Iterations);
    }

    let converged = submission.is_some();
    let (answer, query) = match submission {
        Some(s) => (s.answer, s.sparql.filter(|q| !q.trim().is_empty())),
        None => (engine.partial_answer(), None),
    };
    let duration_ms = clock.elapsed().as_millis() as u64;
    obs::emit_run_finished(&run_id, trajectory.len(), converged, duration_ms);

    RunResult {
        run_id,
        task: task.to_string(),
        answer,
        query,
        converged,
        iteration_count: trajectory.len(),
        leakage: toolbox.leakage(),
        trajectory,
        context: rendered,
        memory_ids: context.memory_ids,
        exhausted,
        error,
        started_at,
        duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use oxigraph::io::RdfFormat;

    use crate::fakes::ScriptedModel;

    const TTL: &str = r#"
@prefix ex: <http://example.org/onto#> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
ex:Activity a owl:Class .
ex:Agent a owl:Class .
"#;

    fn graph() -> (GraphAdapter, String) {
        let adapter = GraphAdapter::new(Arc::new(BlobStore::new()));
        let r = adapter
            .load_from_str("t.ttl", TTL, RdfFormat::Turtle)
            .unwrap();
        (adapter, r.key)
    }

    fn runner(
        model: Arc<ScriptedModel>,
        max_iterations: usize,
        max_calls: usize,
    ) -> ExecutionRunner {
        let mut cfg = BankConfig::default();
        cfg.runner.max_iterations = max_iterations;
        cfg.runner.max_calls = max_calls;
        ExecutionRunner::new(model, cfg)
    }

    #[tokio::test]
    async fn test_converges_on_submit() {
        let (adapter, key) = graph();
        let model = Arc::new(ScriptedModel::new([
            r#"{"tool": "graph_classes"}"#,
            r#"{"submit": {"answer": "Activity and Agent", "sparql": "SELECT ?c WHERE { ?c a owl:Class }"}}"#,
        ]));
        let result = runner(model.clone(), 5, 10)
            .run_loaded(&adapter, &key, "List the classes", None)
            .await
            .unwrap();

        assert!(result.converged);
        assert_eq!(result.answer, "Activity and Agent");
        assert!(result.query.as_deref().unwrap().contains("owl:Class"));
        assert_eq!(result.iteration_count, 2);
        assert!(result.trajectory[0].output.contains("Activity"));
        assert_eq!(result.leakage.tool_calls, 1);
        assert_eq!(result.leakage.subcalls, 2);
        assert_eq!(result.exhausted, None);

        let first = &model.requests()[0];
        assert!(first.transcript().contains("Task: List the classes"));
        assert!(first.transcript().contains("graph_query(sparql"));
    }

    #[tokio::test]
    async fn test_iteration_cap_holds() {
        let (adapter, key) = graph();
        let model = Arc::new(ScriptedModel::default().with_fallback(r#"{"tool": "graph_stats"}"#));
        let result = runner(model, 3, 100)
            .run_loaded(&adapter, &key, "Loop forever", None)
            .await
            .unwrap();

        assert!(!result.converged);
        assert_eq!(result.iteration_count, 3);
        assert_eq!(result.trajectory.len(), 3);
        assert_eq!(result.exhausted, Some(ExhaustReason::Iterations));
        assert!(!result.answer.is_empty());
    }

    #[tokio::test]
    async fn test_call_cap_holds() {
        let (adapter, key) = graph();
        let model = Arc::new(ScriptedModel::default().with_fallback("thinking..."));
        let result = runner(model.clone(), 10, 2)
            .run_loaded(&adapter, &key, "t", None)
            .await
            .unwrap();

        assert_eq!(model.call_count(), 2);
        assert_eq!(result.iteration_count, 2);
        assert_eq!(result.exhausted, Some(ExhaustReason::Calls));
        assert_eq!(result.answer, "thinking...");
        assert!(result.trajectory[0].output.starts_with("ERROR:"));
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back() {
        let (adapter, key) = graph();
        let model = Arc::new(ScriptedModel::new([
            r#"{"tool": "graph_query", "args": {"sparql": "SELEC nonsense"}}"#,
            r#"{"submit": {"answer": "recovered", "sparql": null}}"#,
        ]));
        let result = runner(model.clone(), 5, 5)
            .run_loaded(&adapter, &key, "t", None)
            .await
            .unwrap();

        assert!(result.converged);
        assert_eq!(result.query, None);
        assert!(result.trajectory[0].output.starts_with("ERROR: tool 'graph_query' failed"));
        assert!(model.requests()[1].transcript().contains("Observation:\nERROR:"));
    }

    #[tokio::test]
    async fn test_model_failure_yields_unconverged_result() {
        let (adapter, key) = graph();
        let model = Arc::new(ScriptedModel::default());
        let result = runner(model, 5, 5)
            .run_loaded(&adapter, &key, "t", None)
            .await
            .unwrap();

        assert!(!result.converged);
        assert_eq!(result.answer, "");
        assert!(result.error.unwrap().contains("exhausted"));
        assert_eq!(result.iteration_count, 0);
    }
}
