//! Step-wise execution engine.
//!
//! An engine advances one reasoning/action step at a time and reports a
//! tagged [`StepOutcome`]; the runner owns the iteration cap and decides
//! whether to continue. [`ReplEngine`] drives a [`LanguageModel`] with a
//! small JSON action protocol:
//!
//! ```text
//! {"tool": "graph_query", "args": {"sparql": "SELECT ..."}}
//! {"submit": {"answer": "...", "sparql": "SELECT ..."}}
//! ```
//!
//! Every model invocation is charged against `max_calls`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, LlmError};
use crate::tools::{ToolBox, ToolInvocation};

const SYSTEM_PREAMBLE: &str = "\
You answer questions about an RDF graph. Large data stays behind handles: \
tools return short text or a handle such as Ref(key=results_3, ...), and you \
inspect handles with blob_peek, blob_slice or blob_stats.

Reply with exactly one JSON object per turn, either a tool call
  {\"tool\": \"<name>\", \"args\": {...}}
or your final answer
  {\"submit\": {\"answer\": \"<answer>\", \"sparql\": \"<query used, or null>\"}}";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("language model failed: {0}")]
    Llm(#[from] LlmError),
}

/// One reasoning/action step: what the engine emitted and what came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub code: String,
    pub output: String,
}

/// Final structured payload of a converged run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub answer: String,
    #[serde(default)]
    pub sparql: Option<String>,
}

/// Why an engine stopped without submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    Iterations,
    Calls,
}

/// Result of a single engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A step ran; keep going.
    Ongoing(TrajectoryStep),
    /// The engine submitted its final answer in this step.
    Submitted {
        step: TrajectoryStep,
        submission: Submission,
    },
    /// No step ran because a budget is spent.
    Exhausted(ExhaustReason),
}

/// Parsed model action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tool(ToolInvocation),
    Submit(Submission),
}

impl Action {
    /// Decode the first JSON object in `reply`. Code fences and surrounding
    /// prose are tolerated.
    pub fn parse(reply: &str) -> Result<Self, String> {
        let json = extract_json_object(reply)
            .ok_or_else(|| "no JSON object found in reply".to_string())?;
        let value: Value =
            serde_json::from_str(json).map_err(|e| format!("invalid JSON action: {e}"))?;

        if let Some(submit) = value.get("submit") {
            let submission = match submit {
                Value::String(answer) => Submission {
                    answer: answer.clone(),
                    sparql: None,
                },
                other => serde_json::from_value(other.clone())
                    .map_err(|e| format!("invalid submit payload: {e}"))?,
            };
            return Ok(Self::Submit(submission));
        }
        if let Some(name) = value.get("tool").and_then(Value::as_str) {
            let args = value
                .get("args")
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            return Ok(Self::Tool(ToolInvocation::new(name, args)));
        }
        Err("expected an object with a \"tool\" or \"submit\" key".to_string())
    }
}

/// First balanced `{...}` in `text`, string-literal aware.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A step-wise reasoning engine.
#[async_trait]
pub trait ExecutionEngine: Send {
    /// Advance one step, invoking tools through `tools`.
    async fn step(&mut self, tools: &ToolBox<'_>) -> Result<StepOutcome, EngineError>;

    /// Best answer text produced so far; empty when nothing was produced.
    fn partial_answer(&self) -> String;

    /// Language-model invocations made so far.
    fn calls_made(&self) -> usize;
}

/// Model-driven engine holding the running transcript.
pub struct ReplEngine {
    model: Arc<dyn LanguageModel>,
    messages: Vec<ChatMessage>,
    max_calls: usize,
    calls: usize,
    max_tokens: Option<u32>,
    last_reply: Option<String>,
}

impl ReplEngine {
    /// `context` is the rendered layer cake; `tool_list` the rendered registry.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        context: &str,
        tool_list: &str,
        task: &str,
        max_calls: usize,
    ) -> Self {
        let mut system = format!("{SYSTEM_PREAMBLE}\n\nTools:\n{tool_list}");
        if !context.is_empty() {
            system.push_str("\n\nContext:\n");
            system.push_str(context);
        }
        Self {
            model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(format!("Task: {task}"))],
            max_calls,
            calls: 0,
            max_tokens: None,
            last_reply: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

#[async_trait]
impl ExecutionEngine for ReplEngine {
    async fn step(&mut self, tools: &ToolBox<'_>) -> Result<StepOutcome, EngineError> {
        if self.calls >= self.max_calls {
            return Ok(StepOutcome::Exhausted(ExhaustReason::Calls));
        }

        let mut request = CompletionRequest::new(self.messages.clone());
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        self.calls += 1;
        tools.record_subcall();
        let reply = self.model.complete(&request).await?;
        self.last_reply = Some(reply.clone());
        self.messages.push(ChatMessage::assistant(reply.clone()));

        let output = match Action::parse(&reply) {
            Ok(Action::Submit(submission)) => {
                let step = TrajectoryStep {
                    code: reply,
                    output: submission.answer.clone(),
                };
                return Ok(StepOutcome::Submitted { step, submission });
            }
            Ok(Action::Tool(call)) => match tools.execute(&call).await {
                Ok(text) => text,
                Err(e) => format!("ERROR: {e}"),
            },
            Err(message) => format!("ERROR: {message}"),
        };
        debug!(calls = self.calls, output_chars = output.chars().count(), "engine step");

        self.messages
            .push(ChatMessage::user(format!("Observation:\n{output}")));
        Ok(StepOutcome::Ongoing(TrajectoryStep {
            code: reply,
            output,
        }))
    }

    fn partial_answer(&self) -> String {
        let Some(reply) = &self.last_reply else {
            return String::new();
        };
        // A half-formed submit still carries the best answer text.
        extract_json_object(reply)
            .and_then(|json| serde_json::from_str::<Value>(json).ok())
            .and_then(|v| {
                v.pointer("/submit/answer")
                    .or_else(|| v.get("answer"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| reply.trim().to_string())
    }

    fn calls_made(&self) -> usize {
        self.calls
    }
}
