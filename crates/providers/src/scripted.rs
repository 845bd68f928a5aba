//! A provider that replays canned responses.
//!
//! Used by tests and the CLI's `--dry-run` mode. Every request is recorded so
//! callers can assert on what the orchestrator sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use orcha_core::error::ProviderError;
use orcha_core::provider::{Completion, CompletionRequest, ModelProvider};

pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    /// Replayed forever once the queue is drained.
    repeat: Option<Completion>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    /// Return the given completions in order, then fail with
    /// [`ProviderError::Exhausted`].
    pub fn new(responses: Vec<Completion>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Like [`ScriptedProvider::new`], but individual turns may fail.
    pub fn with_results(responses: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Return the same completion on every call.
    pub fn repeating(response: Completion) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of completed calls.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            requests.push(request);
            requests.len()
        };

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match (next, &self.repeat) {
            (Some(response), _) => response,
            (None, Some(repeat)) => Ok(repeat.clone()),
            (None, None) => Err(ProviderError::Exhausted(call)),
        }
    }
}
