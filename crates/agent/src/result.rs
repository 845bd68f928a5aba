//! The terminal artifact of an execution.

use orcha_core::Message;
use orcha_telemetry::CostTracking;
use serde::{Deserialize, Serialize};

/// Outcome of [`Orchestrator::execute`](crate::Orchestrator::execute).
///
/// Failures are data: a provider error, an exhausted budget or the
/// iteration cap all yield `success: false` with `error` set, plus whatever
/// history and cost had accumulated up to that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    /// Final assistant text, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Display form of the terminal error, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Full history, including the seeded system prompt
    pub messages: Vec<Message>,

    pub cost_tracking: CostTracking,

    /// Iterations used by this execution
    pub iterations: u32,

    /// Distinct tools dispatched this session, in first-use order
    pub tool_calls_used: Vec<String>,
}

impl ExecutionResult {
    /// The final answer, or an empty string on failure.
    pub fn text(&self) -> &str {
        self.result.as_deref().unwrap_or_default()
    }
}
