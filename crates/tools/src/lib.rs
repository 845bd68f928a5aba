//! Built-in tool implementations for Orcha.
//!
//! Tools give the model a way to act: do math, tell the time, and fetch
//! URLs. Each one declares a parameter schema so the registry can validate
//! calls before they run.

pub mod calculator;
pub mod http_fetch;
pub mod timestamp;

use std::sync::Arc;

use orcha_core::tool::{Tool, ToolRegistry};

pub use calculator::CalculatorTool;
pub use http_fetch::HttpFetchTool;
pub use timestamp::TimestampTool;

/// All built-in tools, in a stable order.
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CalculatorTool),
        Arc::new(TimestampTool::new()),
        Arc::new(HttpFetchTool::new()),
    ]
}

/// A registry pre-loaded with [`default_tools`].
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in default_tools() {
        // Built-in names are distinct
        let _ = registry.register(tool);
    }
    registry
}
