//! Lifecycle events emitted by the orchestrator.
//!
//! Listeners are plain closures registered with [`EventEmitter::on`]. Events
//! are delivered synchronously, in registration order. A listener that
//! panics is logged and skipped; the loop and the other listeners carry on.

use std::panic::{AssertUnwindSafe, catch_unwind};

use orcha_core::MessageToolCall;
use orcha_telemetry::{Budget, CostTracking};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::result::ExecutionResult;

/// The settings an execution starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub provider: String,
    pub model: String,
    pub max_iterations: u32,
    pub streaming: bool,
    pub budget: Budget,
    /// Registered tool names, in registration order.
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Events emitted while an execution runs.
///
/// Wire names follow the `type` tag:
/// - `start`       - execution begins
/// - `iteration`   - a model turn finished
/// - `chunk`       - partial text while streaming
/// - `tool_call`   - a tool is about to run
/// - `tool_result` - a tool finished (or failed)
/// - `complete`    - execution succeeded
/// - `error`       - execution failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    Start { settings: RunSettings },

    Iteration {
        iteration: u32,
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<MessageToolCall>,
        cost_tracking: CostTracking,
    },

    Chunk { iteration: u32, content: String },

    ToolCall {
        iteration: u32,
        id: String,
        name: String,
        /// Parsed arguments, or the raw string when it is not valid JSON.
        arguments: Value,
    },

    ToolResult {
        iteration: u32,
        id: String,
        name: String,
        success: bool,
        output: String,
    },

    Complete { result: Box<ExecutionResult> },

    Error { result: Box<ExecutionResult> },
}

impl OrchestratorEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Iteration { .. } => "iteration",
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Handle returned by [`EventEmitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type EventHandler = Box<dyn Fn(&OrchestratorEvent) + Send + Sync>;

/// Ordered list of event listeners.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<(ListenerId, EventHandler)>,
    next_id: u64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event.
    pub fn on<F>(&mut self, handler: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(handler)));
        id
    }

    /// Unsubscribe. Returns `false` if the listener was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Deliver an event to every listener in registration order.
    pub fn emit(&self, event: &OrchestratorEvent) {
        for (id, handler) in &self.listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                warn!(
                    listener = ?id,
                    event = event.event_type(),
                    panic = panic_message(payload.as_ref()),
                    "Event listener panicked"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
