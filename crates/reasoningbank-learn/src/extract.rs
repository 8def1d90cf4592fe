//! Extract stage: distil reusable memory items from a judged run.
//!
//! Successful runs yield strategies, failed runs yield guardrails; the
//! prompts differ and the resulting items carry the matching polarity.

use serde::Deserialize;
use tracing::debug;

use reasoningbank_core::{ChatMessage, CompletionRequest, LanguageModel, RunResult};
use reasoningbank_state::{Item, Polarity};

use crate::decode::decode;
use crate::error::{LearnError, LearnResult};
use crate::judge::Judgment;

/// Most recent trajectory steps shown to the extractor.
const MAX_STEPS_SHOWN: usize = 8;
/// Per-step observation excerpt, in characters.
const MAX_OBSERVATION_CHARS: usize = 300;

const SUCCESS_PROMPT: &str = "\
The trajectory below answered the task correctly. Extract reusable \
strategies: what made it work, stated so that it helps with other questions \
about the same kind of ontology. Do not restate the answer itself.";

const FAILURE_PROMPT: &str = "\
The trajectory below failed the task. Extract guardrails: the mistake that \
was made and what to do instead next time. Be concrete about queries, \
vocabulary and tool use.";

const FORMAT: &str = "\
Reply with a JSON array only. Each element is an object with \"title\" (at \
most ten words), \"description\" (one sentence saying when it applies) and \
\"content\" (the actionable advice). An empty array is fine when nothing is \
worth keeping.";

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "desc")]
    description: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct Wrapped {
    items: Vec<Candidate>,
}

/// Polarity of items learned from a run with this verdict.
pub fn polarity_for(judgment: &Judgment) -> Polarity {
    if judgment.success {
        Polarity::Success
    } else {
        Polarity::Failure
    }
}

pub fn extract_request(
    run: &RunResult,
    judgment: &Judgment,
    temperature: f32,
    max_items: usize,
) -> CompletionRequest {
    let instructions = match polarity_for(judgment) {
        Polarity::Success => SUCCESS_PROMPT,
        _ => FAILURE_PROMPT,
    };
    let system = format!("{instructions}\n\nReturn at most {max_items} items. {FORMAT}");

    let mut user = format!(
        "Task: {}\nAnswer: {}\nVerdict: {}",
        run.task,
        run.answer,
        judgment.reason
    );
    if let Some(query) = &run.query {
        user.push_str("\nSPARQL: ");
        user.push_str(query);
    }
    user.push_str("\n\nTrajectory:");
    let skip = run.trajectory.len().saturating_sub(MAX_STEPS_SHOWN);
    for (i, step) in run.trajectory.iter().enumerate().skip(skip) {
        let observation: String = step.output.chars().take(MAX_OBSERVATION_CHARS).collect();
        user.push_str(&format!(
            "\n[{}] Action: {}\nObservation: {}",
            i + 1,
            step.code.trim(),
            observation
        ));
    }

    CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
        .with_temperature(temperature)
}

/// Decode candidate items from an extractor reply.
///
/// Accepts a bare array or `{"items": [...]}`. Candidates without a title
/// or content are dropped; at most `max_items` are kept.
pub fn parse_items(reply: &str, polarity: Polarity, max_items: usize) -> LearnResult<Vec<Item>> {
    let candidates: Vec<Candidate> = match decode(reply, '[', ']') {
        Ok(list) => list,
        Err(array_err) => decode::<Wrapped>(reply, '{', '}')
            .map(|w| w.items)
            .map_err(|_| LearnError::Malformed {
                stage: "extract",
                message: array_err,
            })?,
    };

    Ok(candidates
        .into_iter()
        .filter(|c| !c.title.trim().is_empty() && !c.content.trim().is_empty())
        .take(max_items)
        .map(|c| Item::new(c.title.trim(), c.description.trim(), c.content.trim(), polarity))
        .collect())
}

/// Extract up to `max_items` items from `run`.
pub async fn extract(
    model: &dyn LanguageModel,
    run: &RunResult,
    judgment: &Judgment,
    temperature: f32,
    max_items: usize,
) -> LearnResult<Vec<Item>> {
    let request = extract_request(run, judgment, temperature, max_items);
    let reply = model.complete(&request).await?;
    let items = parse_items(&reply, polarity_for(judgment), max_items)?;
    debug!(count = items.len(), "extracted memory items");
    Ok(items)
}
