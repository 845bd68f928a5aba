//! Shared test helpers for orchestrator tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use orcha_core::error::ProviderError;
use orcha_core::message::MessageToolCall;
use orcha_core::provider::{
    ChunkReceiver, Completion, CompletionRequest, ModelConfig, ModelPricing, ModelProvider,
    StreamChunk, Usage,
};
use orcha_core::tool::{FnTool, ParameterKind, ParameterSpec, Tool, ToolParameters};
use serde_json::Value;

use crate::event::OrchestratorEvent;
use crate::orchestrator::Orchestrator;

/// Model config with round per-1K rates: 0.001 in, 0.002 out.
pub fn test_model() -> ModelConfig {
    ModelConfig::new("scripted", "test-model").with_pricing(ModelPricing::new(0.001, 0.002))
}

/// A completion that calls `name` once, with call id `call_<name>`.
pub fn calls(name: &str, arguments: Value) -> Completion {
    Completion::tool_calls(vec![MessageToolCall::new(
        format!("call_{name}"),
        name,
        arguments.to_string(),
    )])
}

/// `echo {text}`: returns the text as a JSON string.
pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "echo",
        "Echoes back the input",
        ToolParameters::new().with(
            "text",
            ParameterSpec::new(ParameterKind::String, "Text to echo").required(),
        ),
        |args: Value| async move { Ok::<_, anyhow::Error>(args["text"].clone()) },
    ))
}

/// A parameterless tool that always returns `value`.
pub fn value_tool(name: &str, value: Value) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(name, "Returns a fixed value", ToolParameters::new(), move |_: Value| {
        let value = value.clone();
        async move { Ok::<_, anyhow::Error>(value) }
    }))
}

/// A parameterless tool that always fails with `message`.
pub fn failing_tool(name: &str, message: &'static str) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(name, "Always fails", ToolParameters::new(), move |_: Value| async move {
        Err::<Value, _>(anyhow::anyhow!(message))
    }))
}

/// A parameterless tool that charges `cost` per call.
pub fn priced_tool(name: &str, cost: f64) -> Arc<dyn Tool> {
    Arc::new(
        FnTool::new(name, "Costs money", ToolParameters::new(), |_: Value| async {
            Ok::<_, anyhow::Error>(Value::String("paid".into()))
        })
        .with_cost(cost),
    )
}

/// Collect every event the orchestrator emits.
pub fn record_events(orch: &mut Orchestrator) -> Arc<Mutex<Vec<OrchestratorEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    orch.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

/// Streams its text in the given pieces; usage arrives on the final chunk.
///
/// With [`ChunkedProvider::with_first_tool_calls`], the first stream sends
/// no text and delivers those calls on its `done` chunk instead.
pub struct ChunkedProvider {
    pieces: Vec<&'static str>,
    first_tool_calls: Mutex<Option<Vec<MessageToolCall>>>,
    saw_stream_flag: AtomicBool,
}

impl ChunkedProvider {
    pub fn new(pieces: Vec<&'static str>) -> Self {
        Self {
            pieces,
            first_tool_calls: Mutex::new(None),
            saw_stream_flag: AtomicBool::new(false),
        }
    }

    pub fn with_first_tool_calls(self, calls: Vec<MessageToolCall>) -> Self {
        *self.first_tool_calls.lock().unwrap() = Some(calls);
        self
    }

    /// Whether a request arrived with `stream: true`.
    pub fn saw_stream_flag(&self) -> bool {
        self.saw_stream_flag.load(Ordering::SeqCst)
    }

    fn usage() -> Usage {
        Usage::new(7, 3)
    }
}

#[async_trait::async_trait]
impl ModelProvider for ChunkedProvider {
    fn name(&self) -> &str {
        "chunked"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        Ok(Completion {
            content: self.pieces.concat(),
            usage: Some(Self::usage()),
            ..Default::default()
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver, ProviderError> {
        if request.stream {
            self.saw_stream_flag.store(true, Ordering::SeqCst);
        }
        let (tx, rx) = tokio::sync::mpsc::channel(self.pieces.len() + 1);
        let tool_calls = self.first_tool_calls.lock().unwrap().take();
        if tool_calls.is_none() {
            for piece in &self.pieces {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(piece.to_string()),
                        ..Default::default()
                    }))
                    .await;
            }
        }
        let _ = tx
            .send(Ok(StreamChunk {
                tool_calls: tool_calls.unwrap_or_default(),
                done: true,
                usage: Some(Self::usage()),
                ..Default::default()
            }))
            .await;
        Ok(rx)
    }
}
