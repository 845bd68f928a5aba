//! The orchestration loop, the heart of Orcha.
//!
//! The orchestrator follows a **Call → Act → Observe** cycle:
//!
//! 1. **Send** the conversation and tool definitions to the model
//! 2. **If tool calls**: validate and run each one, append the results
//! 3. **Loop** until the model answers with text only
//!
//! Iteration caps and budget ceilings end the loop early. Every outcome,
//! good or bad, comes back as an [`ExecutionResult`]; lifecycle events are
//! delivered to listeners along the way.

pub mod event;
pub mod orchestrator;
pub mod presets;
pub mod result;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use event::{EventEmitter, EventHandler, ListenerId, OrchestratorEvent, RunSettings};
pub use orchestrator::{
    DEFAULT_MAX_ITERATIONS, ModelInfo, Orchestrator, OrchestratorBuilder, OrchestratorState,
};
pub use result::ExecutionResult;
