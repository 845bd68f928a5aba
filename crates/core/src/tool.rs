//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool is a named, schema-described async function the model can ask the
//! orchestrator to run. Tools are registered in a [`ToolRegistry`], which
//! validates arguments against the declared schema before dispatching.

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;

/// The closed set of parameter types a tool can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterKind {
    /// Whether a JSON value has this kind. `Object` excludes arrays and null.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    /// JSON Schema type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Allowed values, if the parameter is an enumeration.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl ParameterSpec {
    pub fn new(kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: false,
            allowed: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the parameter to a fixed set of values.
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Ordered parameter schema of a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolParameters(IndexMap<String, ParameterSpec>);

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder style).
    pub fn with(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.0.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterSpec)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a JSON Schema object for provider adapters.
    pub fn json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for (name, spec) in &self.0 {
            let mut prop = serde_json::json!({
                "type": spec.kind.as_str(),
                "description": spec.description,
            });
            if let Some(allowed) = &spec.allowed {
                prop["enum"] = Value::Array(allowed.clone());
            }
            properties.insert(name.clone(), prop);
            if spec.required {
                required.push(Value::String(name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check arguments against the schema.
    ///
    /// `null` arguments are treated as an empty object, and a `null`
    /// parameter value counts as absent.
    pub fn validate(&self, tool: &str, arguments: &Value) -> Result<(), ToolError> {
        let invalid = |parameter: &str, reason: String| ToolError::Validation {
            tool: tool.to_string(),
            parameter: parameter.to_string(),
            reason,
        };

        let empty = serde_json::Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(invalid(
                    "<arguments>",
                    format!("must be a JSON object, got {}", json_type_name(other)),
                ));
            }
        };

        for (name, spec) in &self.0 {
            let value = match args.get(name) {
                Some(Value::Null) | None => {
                    if spec.required {
                        return Err(invalid(name, "is required".into()));
                    }
                    continue;
                }
                Some(value) => value,
            };

            if !spec.kind.matches(value) {
                return Err(invalid(
                    name,
                    format!("must be {}, got {}", spec.kind, json_type_name(value)),
                ));
            }

            if let Some(allowed) = &spec.allowed {
                if !allowed.contains(value) {
                    return Err(invalid(
                        name,
                        format!("must be one of {}", Value::Array(allowed.clone())),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// A tool definition handed to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// Declared parameters
    pub parameters: ToolParameters,
}

impl ToolDefinition {
    pub fn json_schema(&self) -> Value {
        self.parameters.json_schema()
    }
}

/// The core Tool trait.
///
/// Each built-in tool (calculator, timestamp, http_fetch) and every
/// caller-supplied capability implements this trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Declared parameter schema.
    fn parameters(&self) -> ToolParameters;

    /// Execute the tool with already-validated arguments.
    ///
    /// The result is opaque to the orchestrator; it is serialized into the
    /// tool message verbatim.
    async fn execute(&self, arguments: Value) -> anyhow::Result<Value>;

    /// Cost in USD added to the running estimate each time the tool runs.
    fn cost_per_call(&self) -> f64 {
        0.0
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// A tool backed by an async closure.
///
/// Handy for one-off capabilities and tests:
///
/// ```ignore
/// let echo = FnTool::new("echo", "Echo the text back", params, |args| async move {
///     Ok(args["text"].clone())
/// });
/// ```
pub struct FnTool<F> {
    name: String,
    description: String,
    parameters: ToolParameters,
    cost: f64,
    handler: F,
}

impl<F> FnTool<F> {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            cost: 0.0,
            handler,
        }
    }

    /// Charge a fixed cost per call.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> ToolParameters {
        self.parameters.clone()
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<Value> {
        (self.handler)(arguments).await
    }

    fn cost_per_call(&self) -> f64 {
        self.cost
    }
}

/// A registry of available tools.
///
/// The orchestrator uses this to:
/// 1. Get tool definitions to send to the model
/// 2. Validate and execute tools when the model requests them
/// 3. Track which tools were used this session
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
    used: IndexSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.shift_remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tools, in registration order.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and execute a tool.
    ///
    /// The name is recorded as used only once validation passes.
    pub async fn execute(&mut self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tool.parameters().validate(name, &arguments)?;
        self.used.insert(name.to_string());

        tool.execute(arguments)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool: name.to_string(),
                reason: format!("{e:#}"),
            })
    }

    /// Names of tools dispatched since the last reset, in first-use order.
    pub fn used_tools(&self) -> Vec<String> {
        self.used.iter().cloned().collect()
    }

    /// Clear usage tracking; registrations are kept.
    pub fn reset(&mut self) {
        self.used.clear();
    }
}
