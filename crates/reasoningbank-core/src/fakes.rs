//! In-memory fakes for the language-model seam (testing only)
//!
//! `ScriptedModel` replays canned responses in order and records every
//! request it receives, so the runner, judge and extractor can be exercised
//! without network access.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::{CompletionRequest, LanguageModel, LlmError, LlmResult};

#[derive(Debug)]
enum Scripted {
    Reply(String),
    Fail(String),
}

/// Replays scripted replies; errors with `ScriptExhausted` once empty unless
/// a fallback reply is set.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    served: Mutex<usize>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Scripted::Reply(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Reply returned for every call after the script runs out.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Queue a reply at the end of the script.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.script.lock().push_back(Scripted::Reply(reply.into()));
    }

    /// Queue a malformed-response failure at the end of the script.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(Scripted::Fail(message.into()));
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        let mut served = self.served.lock();
        match next {
            Some(Scripted::Reply(reply)) => {
                *served += 1;
                Ok(reply)
            }
            Some(Scripted::Fail(message)) => Err(LlmError::MalformedResponse(message)),
            None => match &self.fallback {
                Some(reply) => Ok(reply.clone()),
                None => Err(LlmError::ScriptExhausted(*served)),
            },
        }
    }
}
