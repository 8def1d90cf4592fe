//! Judge stage: grade one completed run.
//!
//! A single deterministic model call. The verdict is never retried; a failed
//! call or unreadable reply becomes [`Judgment::judge_error`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use reasoningbank_core::{ChatMessage, CompletionRequest, LanguageModel};

use crate::decode::decode;
use crate::error::{LearnError, LearnResult};

const JUDGE_SYSTEM: &str = "\
You grade answers to questions about an RDF ontology. Decide whether the \
answer correctly and completely addresses the task. An answer that relies on \
classes, properties or vocabularies that do not belong to the ontology \
described below is a failure, however fluent it is. An empty answer is a \
failure.

Reply with JSON only: {\"success\": true or false, \"reason\": \"one sentence\"}";

/// Verdict on one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub success: bool,
    pub reason: String,
}

impl Judgment {
    /// Reason recorded when no verdict could be obtained.
    pub const ERROR_REASON: &'static str = "judge error";

    pub fn judge_error() -> Self {
        Self {
            success: false,
            reason: Self::ERROR_REASON.to_string(),
        }
    }

    pub fn is_judge_error(&self) -> bool {
        !self.success && self.reason == Self::ERROR_REASON
    }
}

/// What the judge sees.
#[derive(Debug, Clone, Copy)]
pub struct JudgeInput<'a> {
    pub task: &'a str,
    pub answer: &'a str,
    pub query: Option<&'a str>,
    /// Ontology overview used to catch answers about the wrong vocabulary.
    pub grounding: Option<&'a str>,
}

#[derive(Deserialize)]
struct Verdict {
    success: bool,
    #[serde(default)]
    reason: String,
}

pub fn judge_request(input: &JudgeInput<'_>, temperature: f32) -> CompletionRequest {
    let mut user = format!("Task: {}\nAnswer: {}", input.task, input.answer);
    if let Some(query) = input.query {
        user.push_str("\nSPARQL: ");
        user.push_str(query);
    }
    if let Some(grounding) = input.grounding.filter(|g| !g.trim().is_empty()) {
        user.push_str("\n\nOntology:\n");
        user.push_str(grounding);
    }
    CompletionRequest::new(vec![ChatMessage::system(JUDGE_SYSTEM), ChatMessage::user(user)])
        .with_temperature(temperature)
}

/// Grade `input`, surfacing model and decoding failures as errors.
pub async fn try_judge(
    model: &dyn LanguageModel,
    input: &JudgeInput<'_>,
    temperature: f32,
) -> LearnResult<Judgment> {
    let reply = model.complete(&judge_request(input, temperature)).await?;
    let verdict: Verdict = decode(&reply, '{', '}').map_err(|message| LearnError::Malformed {
        stage: "judge",
        message,
    })?;
    debug!(success = verdict.success, "judge verdict decoded");
    Ok(Judgment {
        success: verdict.success,
        reason: verdict.reason,
    })
}

/// Grade `input`; any failure yields [`Judgment::judge_error`].
pub async fn judge(
    model: &dyn LanguageModel,
    input: &JudgeInput<'_>,
    temperature: f32,
) -> Judgment {
    try_judge(model, input, temperature)
        .await
        .unwrap_or_else(|_| Judgment::judge_error())
}
