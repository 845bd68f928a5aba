//! Ready-made orchestrator configurations.
//!
//! Each preset returns a builder, so any setting can still be overridden
//! before `build()`.

use std::sync::Arc;

use orcha_core::provider::{ModelConfig, ModelProvider};

use crate::orchestrator::{Orchestrator, OrchestratorBuilder};

/// System prompt used by [`task_runner`].
pub const TASK_RUNNER_PROMPT: &str = "You complete tasks step by step.

1. Restate the goal in one sentence.
2. Break the task into numbered steps.
3. Work through the steps in order, calling tools whenever they can \
give you facts or results you do not already have.
4. After each tool result, check whether the step is done before moving on.
5. When every step is done, reply with the final answer and no tool calls.";

const CONVERSATIONAL_PROMPT: &str = "You are a helpful assistant. Answer directly and \
use the available tools when they help.";

/// Single question, short tool loop (5 iterations).
pub fn simple(provider: Arc<dyn ModelProvider>, model: ModelConfig) -> OrchestratorBuilder {
    Orchestrator::builder(provider, model).max_iterations(5)
}

/// Multi-turn chat (10 iterations per turn).
pub fn conversational(provider: Arc<dyn ModelProvider>, model: ModelConfig) -> OrchestratorBuilder {
    Orchestrator::builder(provider, model)
        .max_iterations(10)
        .system_prompt(CONVERSATIONAL_PROMPT)
}

/// Multi-step tasks with a structured plan-and-execute prompt (15 iterations).
pub fn task_runner(provider: Arc<dyn ModelProvider>, model: ModelConfig) -> OrchestratorBuilder {
    Orchestrator::builder(provider, model)
        .max_iterations(15)
        .system_prompt(TASK_RUNNER_PROMPT)
}
