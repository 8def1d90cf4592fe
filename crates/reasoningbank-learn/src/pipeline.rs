//! Task pipeline: build context → run → judge → extract → consolidate.
//!
//! Tasks run strictly one after another against a single memory store that
//! the caller owns and threads through every call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use reasoningbank_core::layers::sense;
use reasoningbank_core::{
    BankConfig, ExecutionRunner, GraphAdapter, LanguageModel, RunResult, METRICS,
};
use reasoningbank_state::MemStore;

use crate::controller::{ClosedLoopController, LoopRecord};
use crate::error::LearnResult;

/// One executed and learned-from task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub result: RunResult,
    pub record: LoopRecord,
}

/// Executes tasks and feeds every result through the closed loop.
pub struct TaskPipeline {
    runner: ExecutionRunner,
    controller: ClosedLoopController,
    grounding_budget: usize,
}

impl TaskPipeline {
    /// One model drives both execution and learning.
    pub fn new(model: Arc<dyn LanguageModel>, cfg: BankConfig) -> Self {
        let controller = ClosedLoopController::new(Arc::clone(&model), cfg.learn);
        let grounding_budget = cfg.layers.sense.char_budget;
        Self {
            runner: ExecutionRunner::new(model, cfg),
            controller,
            grounding_budget,
        }
    }

    /// Separate execution and learning components.
    pub fn from_parts(runner: ExecutionRunner, controller: ClosedLoopController) -> Self {
        let grounding_budget = runner.config().layers.sense.char_budget;
        Self {
            runner,
            controller,
            grounding_budget,
        }
    }

    pub fn runner(&self) -> &ExecutionRunner {
        &self.runner
    }

    pub fn controller(&self) -> &ClosedLoopController {
        &self.controller
    }

    /// Sense card text the judge is grounded on.
    pub fn grounding(&self, graph: &GraphAdapter, graph_key: &str) -> LearnResult<String> {
        let card = graph.sense_card(graph_key)?;
        Ok(sense::pack(&card, self.grounding_budget))
    }

    /// Run one task and learn from its result.
    pub async fn run_task(
        &self,
        graph: &GraphAdapter,
        graph_key: &str,
        task: &str,
        mem: &mut MemStore,
    ) -> LearnResult<TaskOutcome> {
        let grounding = self.grounding(graph, graph_key)?;
        let result = self.runner.run_loaded(graph, graph_key, task, Some(&*mem)).await?;
        let record = self.controller.process(&result, mem, Some(&grounding)).await;
        info!(
            event = "pipeline.task_done",
            run_id = %result.run_id,
            converged = result.converged,
            stage = %record.stage,
            stored = record.stored_ids.len(),
        );
        Ok(TaskOutcome { result, record })
    }

    /// Run `tasks` in order; each task sees what earlier ones stored.
    pub async fn run_batch<S: AsRef<str>>(
        &self,
        graph: &GraphAdapter,
        graph_key: &str,
        tasks: &[S],
        mem: &mut MemStore,
    ) -> LearnResult<Vec<TaskOutcome>> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            outcomes.push(self.run_task(graph, graph_key, task.as_ref(), mem).await?);
        }
        METRICS.flush();
        Ok(outcomes)
    }
}
