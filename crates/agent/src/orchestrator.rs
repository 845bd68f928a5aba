//! The orchestration loop.
//!
//! One [`Orchestrator`] owns a conversation. Each [`Orchestrator::execute`]
//! call drives the cycle:
//!
//! 1. **Append** the caller's input to the history
//! 2. **Check** budget ceilings
//! 3. **Call** the model with the full history and the tool definitions
//! 4. **If tool calls**: run each one, append the results, go back to 2
//! 5. **If text only**: finish with that text
//!
//! The loop also ends when the iteration cap is reached or the provider
//! fails. Every outcome is returned as an [`ExecutionResult`].

use std::sync::Arc;

use orcha_config::AppConfig;
use orcha_core::error::{Error, ProviderError, ToolError};
use orcha_core::message::{History, Message, MessageToolCall};
use orcha_core::provider::{Completion, CompletionRequest, ModelConfig, ModelPricing, ModelProvider};
use orcha_core::tool::{Tool, ToolDefinition, ToolRegistry};
use orcha_telemetry::{Budget, CostTracker, CostTracking, PricingTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::event::{EventEmitter, ListenerId, OrchestratorEvent, RunSettings};
use crate::result::ExecutionResult;

/// Default cap on model turns per execution.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Lifecycle of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// The active model, as reported by [`Orchestrator::model_info`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Configured provider key, e.g. `openai`
    pub provider: String,
    /// Name reported by the provider adapter
    pub backend: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub pricing: ModelPricing,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    provider: Arc<dyn ModelProvider>,
    model: ModelConfig,
    tools: Vec<Arc<dyn Tool>>,
    system_prompt: Option<String>,
    budget: Budget,
    max_iterations: u32,
    streaming: bool,
    pricing: Option<PricingTable>,
}

impl OrchestratorBuilder {
    /// Register a tool.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register several tools, in order.
    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Seed the history with a system message.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Use the provider's streaming endpoint and emit `chunk` events.
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    /// Rates used when the model config carries no explicit pricing.
    pub fn pricing(mut self, table: PricingTable) -> Self {
        self.pricing = Some(table);
        self
    }

    /// Validate the settings and build the orchestrator.
    ///
    /// Fails with [`Error::Config`] on a zero iteration cap or when two
    /// tools share a name.
    pub fn build(self) -> Result<Orchestrator, Error> {
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }

        let mut registry = ToolRegistry::new();
        for tool in self.tools {
            registry
                .register(tool)
                .map_err(|e| Error::config(e.to_string()))?;
        }

        let pricing = self.pricing.unwrap_or_default();
        let rates = resolve_rates(&pricing, &self.model);

        debug!(
            provider = %self.model.provider,
            model = %self.model.model,
            tools = registry.len(),
            max_iterations = self.max_iterations,
            "Orchestrator built"
        );

        Ok(Orchestrator {
            provider: self.provider,
            model: self.model,
            registry,
            history: History::new(self.system_prompt.as_deref()),
            cost: CostTracker::new(rates),
            budget: self.budget,
            max_iterations: self.max_iterations,
            streaming: self.streaming,
            pricing,
            emitter: EventEmitter::new(),
            iterations: 0,
            state: OrchestratorState::Idle,
        })
    }
}

/// Drives a conversation between a model and a set of tools.
///
/// `execute` takes `&mut self`, so one instance runs at most one execution
/// at a time. Tools can be added or removed between executions.
pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    model: ModelConfig,
    registry: ToolRegistry,
    history: History,
    cost: CostTracker,
    budget: Budget,
    max_iterations: u32,
    streaming: bool,
    pricing: PricingTable,
    emitter: EventEmitter,
    /// Iterations of the current (or last) execution.
    iterations: u32,
    state: OrchestratorState,
}

impl Orchestrator {
    /// Start building an orchestrator for the given provider and model.
    pub fn builder(provider: Arc<dyn ModelProvider>, model: ModelConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            provider,
            model,
            tools: Vec::new(),
            system_prompt: None,
            budget: Budget::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            streaming: false,
            pricing: None,
        }
    }

    /// Build the provider and all loop settings from the file configuration.
    pub fn from_config(config: &AppConfig, tools: Vec<Arc<dyn Tool>>) -> Result<Self, Error> {
        let provider = orcha_providers::build_provider(&config.model_config())?;
        Self::from_config_with_provider(config, provider, tools)
    }

    /// Like [`Orchestrator::from_config`], with a caller-supplied provider.
    pub fn from_config_with_provider(
        config: &AppConfig,
        provider: Arc<dyn ModelProvider>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Self, Error> {
        let mut builder = Self::builder(provider, config.model_config())
            .tools(tools)
            .budget(config.budget.clone())
            .max_iterations(config.orchestrator.max_iterations)
            .streaming(config.orchestrator.streaming)
            .pricing(config.pricing_table());
        if let Some(prompt) = &config.orchestrator.system_prompt {
            builder = builder.system_prompt(prompt);
        }
        builder.build()
    }

    /// Run one user turn to completion.
    pub async fn execute(&mut self, input: impl Into<String>) -> ExecutionResult {
        self.begin();
        self.append(Message::user(input));
        self.run().await
    }

    /// Append a caller-supplied conversation and run it to completion.
    ///
    /// System messages are only accepted while the history is empty; later
    /// ones are skipped.
    pub async fn execute_messages(&mut self, messages: Vec<Message>) -> ExecutionResult {
        self.begin();
        for message in messages {
            self.append(message);
        }
        self.run().await
    }

    fn begin(&mut self) {
        self.iterations = 0;
        self.state = OrchestratorState::Running;
        info!(
            provider = %self.model.provider,
            model = %self.model.model,
            history = self.history.len(),
            "Starting execution"
        );
        self.emitter.emit(&OrchestratorEvent::Start {
            settings: self.settings(),
        });
    }

    async fn run(&mut self) -> ExecutionResult {
        let outcome = self.drive().await;
        self.finish(outcome)
    }

    async fn drive(&mut self) -> Result<String, Error> {
        let mut completed_cleanly = false;
        let mut answer = String::new();

        while self.iterations < self.max_iterations {
            self.iterations += 1;
            let iteration = self.iterations;
            debug!(iteration, "Orchestrator iteration");

            self.check_budget()?;

            let request = CompletionRequest::new(
                &self.model,
                self.history.snapshot(),
                self.registry.definitions(),
            );
            let completion = if self.streaming {
                self.stream_completion(request, iteration).await?
            } else {
                self.provider.complete(request).await?
            };

            if let Some(usage) = completion.usage {
                self.cost.update_token_usage(
                    u64::from(usage.prompt_tokens),
                    u64::from(usage.completion_tokens),
                );
            }

            let Completion {
                content,
                tool_calls,
                ..
            } = completion;

            self.append(Message::assistant_with_tools(
                content.clone(),
                tool_calls.clone(),
            ));
            self.emitter.emit(&OrchestratorEvent::Iteration {
                iteration,
                content: content.clone(),
                tool_calls: tool_calls.clone(),
                cost_tracking: self.cost.tracking(),
            });

            if tool_calls.is_empty() {
                completed_cleanly = true;
                answer = content;
                break;
            }

            debug!(iteration, count = tool_calls.len(), "Executing tool calls");
            for call in &tool_calls {
                self.dispatch(iteration, call).await;
            }
        }

        if completed_cleanly {
            Ok(answer)
        } else {
            Err(Error::MaxIterations {
                max_iterations: self.max_iterations,
            })
        }
    }

    fn check_budget(&self) -> Result<(), Error> {
        let status = self.cost.check_budget(&self.budget);
        if status.within_budget {
            return Ok(());
        }

        for violation in &status.violations {
            warn!(%violation, "Budget ceiling reached");
        }
        // Ceilings are checked in a fixed order; report the first.
        match status.violations.into_iter().next() {
            Some(v) => Err(Error::BudgetExceeded {
                resource: v.resource.to_string(),
                current: v.current,
                limit: v.limit,
            }),
            None => Ok(()),
        }
    }

    /// Stream a completion, emitting a `chunk` event per content delta.
    async fn stream_completion(
        &self,
        mut request: CompletionRequest,
        iteration: u32,
    ) -> Result<Completion, ProviderError> {
        request.stream = true;
        let mut rx = self.provider.stream(request).await?;

        let mut completion = Completion {
            model: self.model.model.clone(),
            ..Default::default()
        };
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content.filter(|c| !c.is_empty()) {
                self.emitter.emit(&OrchestratorEvent::Chunk {
                    iteration,
                    content: delta.clone(),
                });
                completion.content.push_str(&delta);
            }
            completion.tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                completion.usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }
        Ok(completion)
    }

    /// Run one tool call. Failures become the tool message; they never end
    /// the loop.
    async fn dispatch(&mut self, iteration: u32, call: &MessageToolCall) {
        let parsed = call.parsed_arguments();
        self.emitter.emit(&OrchestratorEvent::ToolCall {
            iteration,
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: match &parsed {
                Ok(args) => args.clone(),
                Err(_) => Value::String(call.arguments.clone()),
            },
        });

        let outcome = match parsed {
            Ok(args) => self.registry.execute(&call.name, args).await,
            Err(e) => Err(ToolError::Validation {
                tool: call.name.clone(),
                parameter: "arguments".into(),
                reason: format!("is not valid JSON: {e}"),
            }),
        };

        let cost_delta = self
            .registry
            .get(&call.name)
            .map_or(0.0, |tool| tool.cost_per_call());
        self.cost.increment_tool_calls(cost_delta);

        let (success, output) = match outcome {
            Ok(value) => {
                debug!(tool = %call.name, "Tool call succeeded");
                (true, render_output(value))
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                (false, format!("Error: {}", e.detail()))
            }
        };

        self.emitter.emit(&OrchestratorEvent::ToolResult {
            iteration,
            id: call.id.clone(),
            name: call.name.clone(),
            success,
            output: output.clone(),
        });
        self.append(Message::tool_result(call.id.clone(), output));
    }

    fn finish(&mut self, outcome: Result<String, Error>) -> ExecutionResult {
        let (result, error) = match outcome {
            Ok(text) => (Some(text), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let success = error.is_none();
        self.state = if success {
            OrchestratorState::Completed
        } else {
            OrchestratorState::Failed
        };

        let result = ExecutionResult {
            success,
            result,
            error,
            messages: self.history.snapshot(),
            cost_tracking: self.cost.tracking(),
            iterations: self.iterations,
            tool_calls_used: self.registry.used_tools(),
        };

        match &result.error {
            None => info!(
                iterations = result.iterations,
                cost = result.cost_tracking.estimated_cost,
                "Execution completed"
            ),
            Some(error) => warn!(
                iterations = result.iterations,
                error = %error,
                "Execution failed"
            ),
        }

        let event = if success {
            OrchestratorEvent::Complete {
                result: Box::new(result.clone()),
            }
        } else {
            OrchestratorEvent::Error {
                result: Box::new(result.clone()),
            }
        };
        self.emitter.emit(&event);

        result
    }

    fn append(&mut self, message: Message) {
        if let Err(rejected) = self.history.push(message) {
            warn!(
                role = %rejected.role,
                "Skipping system message: history already started"
            );
        }
    }

    fn settings(&self) -> RunSettings {
        RunSettings {
            provider: self.model.provider.clone(),
            model: self.model.model.clone(),
            max_iterations: self.max_iterations,
            streaming: self.streaming,
            budget: self.budget.clone(),
            tools: self.registry.names().into_iter().map(String::from).collect(),
            system_prompt: self.history.system_prompt().map(String::from),
        }
    }

    /// Clear history (back to the seeded system prompt), counters and tool
    /// usage. Listeners and tools stay registered.
    pub fn reset(&mut self) {
        self.history.reset();
        self.iterations = 0;
        self.cost.reset();
        self.registry.reset();
        self.state = OrchestratorState::Idle;
        debug!("Orchestrator reset");
    }

    /// Register a tool between executions.
    pub fn add_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), Error> {
        self.registry.register(tool)?;
        Ok(())
    }

    /// Returns whether the tool was registered.
    pub fn remove_tool(&mut self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    /// Definitions of the registered tools, in registration order.
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Distinct tools dispatched this session, in first-use order.
    pub fn used_tools(&self) -> Vec<String> {
        self.registry.used_tools()
    }

    /// Swap the provider and model. History is kept; cost already accrued
    /// keeps its old price.
    pub fn switch_model(&mut self, provider: Arc<dyn ModelProvider>, model: ModelConfig) {
        let rates = resolve_rates(&self.pricing, &model);
        info!(
            from = %self.model.model,
            to = %model.model,
            provider = %model.provider,
            "Switching model"
        );
        self.cost.set_rates(rates);
        self.provider = provider;
        self.model = model;
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.model.provider.clone(),
            backend: self.provider.name().to_string(),
            model: self.model.model.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            pricing: self.cost.rates(),
        }
    }

    /// Owned snapshot of the history.
    pub fn messages(&self) -> Vec<Message> {
        self.history.snapshot()
    }

    pub fn cost_tracking(&self) -> CostTracking {
        self.cost.tracking()
    }

    /// Subscribe to lifecycle events.
    pub fn on_event<F>(&mut self, handler: F) -> ListenerId
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.emitter.on(handler)
    }

    pub fn off_event(&mut self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    /// Iterations used by the current (or last) execution.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("tools", &self.registry.names())
            .field("messages", &self.history.len())
            .field("iterations", &self.iterations)
            .field("max_iterations", &self.max_iterations)
            .field("state", &self.state)
            .finish()
    }
}

/// Explicit pricing on the model config wins over the table.
fn resolve_rates(table: &PricingTable, model: &ModelConfig) -> ModelPricing {
    model
        .pricing
        .unwrap_or_else(|| table.resolve(&model.provider, &model.model))
}

/// JSON strings are inserted raw; anything else as compact JSON.
fn render_output(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use orcha_core::Role;
    use orcha_providers::ScriptedProvider;
    use serde_json::json;

    fn orchestrator(provider: &Arc<ScriptedProvider>) -> OrchestratorBuilder {
        Orchestrator::builder(provider.clone(), test_model())
    }

    #[tokio::test]
    async fn plain_answer_finishes_in_one_iteration() {
        let provider = Arc::new(ScriptedProvider::new(vec![Completion::text("done")]));
        let mut orch = orchestrator(&provider).build().unwrap();

        let result = orch.execute("hello").await;

        assert!(result.success);
        assert_eq!(result.result.as_deref(), Some("done"));
        assert_eq!(result.iterations, 1);
        assert!(result.tool_calls_used.is_empty());
        assert_eq!(orch.state(), OrchestratorState::Completed);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_result_is_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("echo", json!({"text": "hi"})),
            Completion::text("The tool said hi"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .system_prompt("Be brief.")
            .build()
            .unwrap();

        let result = orch.execute("say hi").await;

        assert!(result.success);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_calls_used, vec!["echo"]);

        let roles: Vec<Role> = result.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let tool_msg = &result.messages[3];
        assert_eq!(tool_msg.content, "hi");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_echo"));

        // The second request carried the tool result and the definitions.
        let requests = provider.requests();
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].tools[0].name, "echo");
    }

    #[tokio::test]
    async fn non_string_results_are_compact_json() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("lookup", json!({})),
            Completion::text("ok"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(value_tool("lookup", json!({"temp": 21, "unit": "C"})))
            .build()
            .unwrap();

        let result = orch.execute("weather?").await;
        assert_eq!(result.messages[2].content, r#"{"temp":21,"unit":"C"}"#);
    }

    #[tokio::test]
    async fn tool_failure_is_reported_and_loop_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("explode", json!({})),
            Completion::text("recovered"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(failing_tool("explode", "boom"))
            .build()
            .unwrap();
        let events = record_events(&mut orch);

        let result = orch.execute("try it").await;

        assert!(result.success);
        assert_eq!(result.result.as_deref(), Some("recovered"));
        let tool_msg = result.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, "Error: boom");

        let events = events.lock().unwrap();
        let tool_result = events
            .iter()
            .find_map(|e| match e {
                OrchestratorEvent::ToolResult { success, output, .. } => Some((*success, output.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(tool_result, (false, "Error: boom".to_string()));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_recovered() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Completion::tool_calls(vec![
                MessageToolCall::new("c1", "missing", "{}"),
                MessageToolCall::new("c2", "echo", "{not json"),
                MessageToolCall::new("c3", "echo", "{}"),
            ]),
            Completion::text("done"),
        ]));
        let mut orch = orchestrator(&provider).tool(echo_tool()).build().unwrap();

        let result = orch.execute("go").await;

        assert!(result.success);
        let tool_msgs: Vec<&str> = result
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tool_msgs.len(), 3);
        assert!(tool_msgs[0].starts_with("Error: Tool not found: missing"));
        assert!(tool_msgs[1].contains("not valid JSON"));
        assert!(tool_msgs[2].contains("text"));
        // Validation failures never reach the tool, so nothing was used.
        assert!(result.tool_calls_used.is_empty());
        assert_eq!(result.cost_tracking.tool_calls, 3);
    }

    #[tokio::test]
    async fn empty_arguments_mean_no_arguments() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Completion::tool_calls(vec![MessageToolCall::new("c1", "lookup", "")]),
            Completion::text("done"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(value_tool("lookup", json!("found")))
            .build()
            .unwrap();

        let result = orch.execute("go").await;
        assert_eq!(result.messages[2].content, "found");
    }

    #[tokio::test]
    async fn max_iterations_fails_with_partial_result() {
        let provider = Arc::new(ScriptedProvider::repeating(calls(
            "echo",
            json!({"text": "again"}),
        )));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .max_iterations(1)
            .build()
            .unwrap();

        let result = orch.execute("loop forever").await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("max iterations"));
        assert_eq!(result.iterations, 1);
        assert_eq!(result.cost_tracking.tool_calls, 1);
        assert_eq!(result.tool_calls_used, vec!["echo"]);
        assert_eq!(orch.state(), OrchestratorState::Failed);
    }

    #[tokio::test]
    async fn clean_finish_on_last_iteration_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("echo", json!({"text": "1"})),
            calls("echo", json!({"text": "2"})),
            Completion::text("finished"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .max_iterations(3)
            .build()
            .unwrap();

        let result = orch.execute("count").await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.result.as_deref(), Some("finished"));
    }

    #[tokio::test]
    async fn tool_call_budget_stops_before_third_call() {
        let provider = Arc::new(ScriptedProvider::repeating(calls(
            "echo",
            json!({"text": "more"}),
        )));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .budget(Budget {
                max_tool_calls: Some(2),
                ..Default::default()
            })
            .build()
            .unwrap();

        let result = orch.execute("spend").await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("tool_calls"), "{error}");
        assert!(error.contains("is 2, limit is 2"), "{error}");
        assert_eq!(provider.call_count(), 2);
        // The iteration that tripped the check still counts.
        assert_eq!(result.iterations, 3);
    }

    #[tokio::test]
    async fn token_budget_is_checked_before_the_call() {
        let provider = Arc::new(ScriptedProvider::repeating(
            calls("echo", json!({"text": "x"})).with_usage(600, 500),
        ));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .budget(Budget {
                max_tokens: Some(1000),
                ..Default::default()
            })
            .build()
            .unwrap();

        let result = orch.execute("go").await;

        assert!(result.error.unwrap().contains("tokens"));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(result.cost_tracking.total_tokens(), 1100);
    }

    #[tokio::test]
    async fn provider_error_is_returned_as_data() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let mut orch = orchestrator(&provider).build().unwrap();
        let events = record_events(&mut orch);

        let result = orch.execute("hi").await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("bad key"));
        assert_eq!(result.messages.len(), 1);
        let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["start", "error"]);
    }

    #[tokio::test]
    async fn events_follow_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("echo", json!({"text": "hi"})),
            Completion::text("done"),
        ]));
        let mut orch = orchestrator(&provider).tool(echo_tool()).build().unwrap();
        let events = record_events(&mut orch);

        orch.execute("go").await;

        let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec!["start", "iteration", "tool_call", "tool_result", "iteration", "complete"]
        );

        let events = events.lock().unwrap();
        match &events[0] {
            OrchestratorEvent::Start { settings } => {
                assert_eq!(settings.tools, vec!["echo"]);
                assert_eq!(settings.max_iterations, DEFAULT_MAX_ITERATIONS);
            }
            other => panic!("unexpected first event: {other:?}"),
        }
        match &events[2] {
            OrchestratorEvent::ToolCall { arguments, .. } => assert_eq!(arguments["text"], "hi"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_listener_does_not_abort_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("echo", json!({"text": "hi"})),
            Completion::text("done"),
        ]));
        let mut orch = orchestrator(&provider).tool(echo_tool()).build().unwrap();
        orch.on_event(|_| panic!("listener bug"));
        let events = record_events(&mut orch);

        let result = orch.execute("go").await;

        assert!(result.success);
        assert_eq!(events.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn off_event_stops_delivery() {
        let provider = Arc::new(ScriptedProvider::repeating(Completion::text("ok")));
        let mut orch = orchestrator(&provider).build().unwrap();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = events.clone();
        let id = orch.on_event(move |e| sink.lock().unwrap().push(e.event_type()));

        orch.execute("one").await;
        assert!(orch.off_event(id));
        orch.execute("two").await;

        assert_eq!(events.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn streaming_emits_chunks_and_aggregates() {
        let provider = Arc::new(ChunkedProvider::new(vec!["Hel", "lo", " world"]));
        let mut orch = Orchestrator::builder(provider.clone(), test_model())
            .streaming(true)
            .build()
            .unwrap();
        let events = record_events(&mut orch);

        let result = orch.execute("greet").await;

        assert_eq!(result.result.as_deref(), Some("Hello world"));
        assert_eq!(result.cost_tracking.input_tokens, 7);
        let chunks: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::Chunk { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec!["Hel", "lo", " world"]);
        assert!(provider.saw_stream_flag());
    }

    #[tokio::test]
    async fn streaming_falls_back_to_complete() {
        let provider = Arc::new(ScriptedProvider::new(vec![Completion::text("whole")]));
        let mut orch = orchestrator(&provider).streaming(true).build().unwrap();
        let events = record_events(&mut orch);

        let result = orch.execute("hi").await;

        assert_eq!(result.result.as_deref(), Some("whole"));
        let chunks = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == "chunk")
            .count();
        assert_eq!(chunks, 1);
    }

    #[tokio::test]
    async fn history_is_append_only_across_executions() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("echo", json!({"text": "a"})),
            Completion::text("first"),
            Completion::text("second"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .system_prompt("sys")
            .build()
            .unwrap();

        let before = orch.messages();
        orch.execute("one").await;
        let middle = orch.messages();
        orch.execute("two").await;
        let after = orch.messages();

        assert!(middle.starts_with(&before));
        assert!(after.starts_with(&middle));
        assert_eq!(after.len(), middle.len() + 2);
        assert_eq!(after.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[tokio::test]
    async fn history_is_append_only_when_executions_fail() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![
            Ok(calls("echo", json!({"text": "a"}))),
            Err(ProviderError::RateLimited {
                retry_after_secs: 30,
            }),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .system_prompt("sys")
            .max_iterations(1)
            .build()
            .unwrap();

        let mut snapshots = vec![orch.messages()];

        let result = orch.execute("one").await;
        assert!(result.error.unwrap().contains("max iterations"));
        assert_eq!(result.messages, orch.messages());
        snapshots.push(orch.messages());

        let result = orch.execute("two").await;
        assert!(result.error.unwrap().contains("Rate limited"));
        snapshots.push(orch.messages());

        for pair in snapshots.windows(2) {
            assert!(pair[1].starts_with(&pair[0]));
            assert!(pair[1].len() > pair[0].len());
        }
        assert_eq!(snapshots[1].len(), 4);
        assert_eq!(snapshots[2].len(), 5);
    }

    #[tokio::test]
    async fn history_is_append_only_when_budget_trips() {
        let provider = Arc::new(ScriptedProvider::repeating(calls(
            "echo",
            json!({"text": "x"}),
        )));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .budget(Budget {
                max_tool_calls: Some(1),
                ..Default::default()
            })
            .build()
            .unwrap();

        let first = orch.execute("one").await;
        assert!(first.error.unwrap().contains("tool_calls"));
        let middle = orch.messages();

        let second = orch.execute("two").await;
        assert!(second.error.unwrap().contains("tool_calls"));
        let after = orch.messages();

        assert!(after.starts_with(&middle));
        // Only the user message: the budget trips before any model call.
        assert_eq!(after.len(), middle.len() + 1);
        assert_eq!(after.last().map(|m| m.content.as_str()), Some("two"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn multiple_tool_calls_run_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Completion::tool_calls(vec![
                MessageToolCall::new("c1", "echo", r#"{"text":"first"}"#),
                MessageToolCall::new("c2", "echo", r#"{"text":"second"}"#),
            ]),
            Completion::text("both done"),
        ]));
        let mut orch = orchestrator(&provider).tool(echo_tool()).build().unwrap();
        let events = record_events(&mut orch);

        let result = orch.execute("twice").await;
        assert!(result.success);

        let steps: Vec<(&str, String)> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OrchestratorEvent::ToolCall { id, .. } => Some(("tool_call", id.clone())),
                OrchestratorEvent::ToolResult { id, .. } => Some(("tool_result", id.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            steps,
            vec![
                ("tool_call", "c1".to_string()),
                ("tool_result", "c1".to_string()),
                ("tool_call", "c2".to_string()),
                ("tool_result", "c2".to_string()),
            ]
        );

        let tool_messages: Vec<(Option<&str>, &str)> = result
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.as_deref(), m.content.as_str()))
            .collect();
        assert_eq!(
            tool_messages,
            vec![(Some("c1"), "first"), (Some("c2"), "second")]
        );
        // Both results precede the follow-up request.
        assert_eq!(provider.requests()[1].messages.len(), 4);
        assert_eq!(result.cost_tracking.tool_calls, 2);
    }

    #[tokio::test]
    async fn streamed_tool_calls_are_dispatched() {
        let provider = Arc::new(
            ChunkedProvider::new(vec!["Do", "ne"]).with_first_tool_calls(vec![
                MessageToolCall::new("call_echo", "echo", r#"{"text":"streamed"}"#),
            ]),
        );
        let mut orch = Orchestrator::builder(provider.clone(), test_model())
            .tool(echo_tool())
            .streaming(true)
            .build()
            .unwrap();
        let events = record_events(&mut orch);

        let result = orch.execute("stream a tool call").await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.result.as_deref(), Some("Done"));
        assert_eq!(result.tool_calls_used, vec!["echo"]);
        assert_eq!(result.messages[1].tool_calls[0].name, "echo");
        assert_eq!(result.messages[2].content, "streamed");
        assert_eq!(result.cost_tracking.input_tokens, 14);

        let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec![
                "start",
                "iteration",
                "tool_call",
                "tool_result",
                "chunk",
                "chunk",
                "iteration",
                "complete"
            ]
        );
    }

    #[tokio::test]
    async fn iterations_are_per_execution_cost_is_per_session() {
        let provider = Arc::new(ScriptedProvider::repeating(
            Completion::text("ok").with_usage(100, 50),
        ));
        let mut orch = orchestrator(&provider).build().unwrap();

        let first = orch.execute("one").await;
        let second = orch.execute("two").await;

        assert_eq!(first.iterations, 1);
        assert_eq!(second.iterations, 1);
        assert_eq!(second.cost_tracking.input_tokens, 200);
        assert!(second.cost_tracking.estimated_cost > first.cost_tracking.estimated_cost);
    }

    #[tokio::test]
    async fn cost_is_tokens_plus_tool_deltas() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("paid", json!({})).with_usage(1000, 1000),
            Completion::text("done").with_usage(1000, 0),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(priced_tool("paid", 0.5))
            .build()
            .unwrap();

        let result = orch.execute("go").await;

        // test_model(): 0.001 in / 0.002 out per 1K tokens
        let expected = 0.001 * 2.0 + 0.002 + 0.5;
        assert!((result.cost_tracking.estimated_cost - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn execute_messages_skips_late_system_messages() {
        let provider = Arc::new(ScriptedProvider::repeating(Completion::text("ok")));
        let mut orch = orchestrator(&provider).system_prompt("seeded").build().unwrap();

        let result = orch
            .execute_messages(vec![
                Message::system("ignored"),
                Message::user("q1"),
                Message::assistant("a1"),
                Message::user("q2"),
            ])
            .await;

        assert!(result.success);
        let system: Vec<&str> = result
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(system, vec!["seeded"]);
        assert_eq!(result.messages.len(), 5);
    }

    #[tokio::test]
    async fn execute_messages_accepts_system_on_empty_history() {
        let provider = Arc::new(ScriptedProvider::repeating(Completion::text("ok")));
        let mut orch = orchestrator(&provider).build().unwrap();

        let result = orch
            .execute_messages(vec![Message::system("caller"), Message::user("q")])
            .await;

        assert_eq!(result.messages[0].role, Role::System);
        assert_eq!(result.messages[0].content, "caller");
    }

    #[tokio::test]
    async fn reset_restores_seed_and_clears_counters() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls("echo", json!({"text": "a"})).with_usage(10, 10),
            Completion::text("done"),
        ]));
        let mut orch = orchestrator(&provider)
            .tool(echo_tool())
            .system_prompt("sys")
            .build()
            .unwrap();
        let events = record_events(&mut orch);

        orch.execute("go").await;
        orch.reset();

        assert_eq!(orch.messages().len(), 1);
        assert_eq!(orch.messages()[0].content, "sys");
        assert_eq!(orch.iterations(), 0);
        assert_eq!(orch.cost_tracking(), CostTracking::default());
        assert!(orch.used_tools().is_empty());
        assert_eq!(orch.state(), OrchestratorState::Idle);
        assert!(orch.get_tool("echo").is_some());

        // Listeners survive a reset.
        let before = events.lock().unwrap().len();
        orch.emitter.emit(&OrchestratorEvent::Chunk {
            iteration: 0,
            content: String::new(),
        });
        assert_eq!(events.lock().unwrap().len(), before + 1);
    }

    #[test]
    fn duplicate_tools_fail_construction() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let err = orchestrator(&provider)
            .tool(echo_tool())
            .tool(echo_tool())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn zero_iterations_fail_construction() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let err = orchestrator(&provider).max_iterations(0).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn tools_can_be_added_and_removed() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut orch = orchestrator(&provider).tool(echo_tool()).build().unwrap();

        assert!(matches!(
            orch.add_tool(echo_tool()),
            Err(Error::Tool(ToolError::Duplicate(_)))
        ));
        orch.add_tool(failing_tool("other", "x")).unwrap();
        assert_eq!(orch.tools().len(), 2);

        assert!(orch.remove_tool("echo"));
        assert!(!orch.remove_tool("echo"));
        assert!(orch.get_tool("echo").is_none());
        assert_eq!(orch.tools()[0].name, "other");
    }

    #[tokio::test]
    async fn switch_model_keeps_history_and_accrued_cost() {
        let first = Arc::new(ScriptedProvider::repeating(
            Completion::text("a").with_usage(1000, 1000),
        ));
        let mut orch = orchestrator(&first).build().unwrap();
        orch.execute("one").await;
        let cost_before = orch.cost_tracking().estimated_cost;

        let second = Arc::new(ScriptedProvider::repeating(Completion::text("b")));
        orch.switch_model(
            second.clone(),
            ModelConfig::new("scripted", "cheap").with_pricing(ModelPricing::new(0.0, 0.0)),
        );

        assert_eq!(orch.messages().len(), 2);
        assert_eq!(orch.cost_tracking().estimated_cost, cost_before);
        assert_eq!(orch.model_info().model, "cheap");
        assert_eq!(orch.model_info().pricing, ModelPricing::new(0.0, 0.0));

        let result = orch.execute("two").await;
        assert_eq!(result.result.as_deref(), Some("b"));
        assert_eq!(second.call_count(), 1);
        assert_eq!(second.requests()[0].messages.len(), 3);
    }

    #[test]
    fn rates_come_from_the_pricing_table() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let table = PricingTable::empty();
        table.set("custom-model", ModelPricing::new(1.0, 2.0));

        let orch = Orchestrator::builder(provider.clone(), ModelConfig::new("scripted", "custom-model"))
            .pricing(table)
            .build()
            .unwrap();
        assert_eq!(orch.model_info().pricing, ModelPricing::new(1.0, 2.0));

        let orch = Orchestrator::builder(provider, ModelConfig::new("scripted", "unknown"))
            .pricing(PricingTable::empty())
            .build()
            .unwrap();
        assert_eq!(orch.model_info().pricing, ModelPricing::FALLBACK);
        assert_eq!(orch.model_info().backend, "scripted");
    }

    #[test]
    fn from_config_builds_a_working_orchestrator() {
        let mut config = AppConfig::default();
        config.default_provider = "ollama".into();
        config.default_model = "llama3.2".into();
        config.orchestrator.max_iterations = 4;
        config.orchestrator.system_prompt = Some("From config".into());
        config.budget.max_cost = Some(1.0);

        let orch = Orchestrator::from_config(&config, vec![echo_tool()]).unwrap();

        assert_eq!(orch.max_iterations(), 4);
        assert_eq!(orch.budget().max_cost, Some(1.0));
        assert_eq!(orch.messages()[0].content, "From config");
        assert_eq!(orch.model_info().provider, "ollama");
        assert_eq!(orch.tools().len(), 1);
    }

    #[test]
    fn from_config_without_credentials_fails() {
        let mut config = AppConfig::default();
        config.default_provider = "anthropic".into();
        config.api_key = None;

        let err = Orchestrator::from_config(&config, vec![]).unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::NotConfigured(_))));
    }
}
