//! Error types for the Orcha domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Provider and tool failures have their own enums; the orchestrator's
//! terminal failures (budget, iteration cap) live on the top-level [`Error`].

use thiserror::Error;

/// The top-level error type for all Orcha operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Loop termination ---
    #[error("Budget exceeded: {resource} is {current}, limit is {limit}")]
    BudgetExceeded {
        resource: String,
        current: f64,
        limit: f64,
    },

    #[error("Exceeded max iterations ({max_iterations}) without a final response")]
    MaxIterations { max_iterations: u32 },
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Every failure a model provider can report, regardless of backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Scripted provider has no responses left (call #{0})")]
    Exhausted(usize),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Invalid arguments for {tool}: parameter '{parameter}' {reason}")]
    Validation {
        tool: String,
        parameter: String,
        reason: String,
    },

    #[error("Tool execution failed: {tool}: {reason}")]
    ExecutionFailed { tool: String, reason: String },
}

impl ToolError {
    /// The message to surface back to the model.
    ///
    /// Execution failures report the tool's own message; everything else
    /// reports the full error.
    pub fn detail(&self) -> String {
        match self {
            Self::ExecutionFailed { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}
