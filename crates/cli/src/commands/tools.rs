//! `orcha tools`: list the built-in tools.

use orcha_core::Tool;
use serde_json::{Value, json};

pub fn run() -> anyhow::Result<()> {
    let tools = orcha_tools::default_tools();
    println!("{}", serde_json::to_string_pretty(&schemas(&tools))?);
    Ok(())
}

/// Tool definitions in the function-calling shape providers expect.
fn schemas(tools: &[std::sync::Arc<dyn Tool>]) -> Value {
    tools
        .iter()
        .map(|tool| {
            let def = tool.to_definition();
            json!({
                "name": def.name,
                "description": def.description,
                "parameters": def.json_schema(),
            })
        })
        .collect()
}
