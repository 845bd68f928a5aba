//! `orcha run`: send one prompt through the orchestration loop.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use orcha_agent::{ExecutionResult, Orchestrator, OrchestratorEvent};
use orcha_config::AppConfig;
use orcha_core::{Completion, ModelProvider};
use orcha_providers::{ScriptedProvider, is_local};
use tracing::debug;

pub struct RunArgs {
    pub prompt: String,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub max_iterations: Option<u32>,
    pub stream: bool,
    pub json: bool,
    pub dry_run: bool,
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let tools = orcha_tools::default_tools();
    let mut orch = if args.dry_run {
        Orchestrator::from_config_with_provider(&config, dry_run_provider(&args.prompt), tools)?
    } else {
        if !config.has_api_key() && !is_local(&config.default_provider) {
            bail!(
                "No API key for provider '{}'. Set ORCHA_API_KEY (or the provider's own \
                 variable, e.g. OPENAI_API_KEY) or add api_key to {}",
                config.default_provider,
                AppConfig::config_dir().join("config.toml").display()
            );
        }
        Orchestrator::from_config(&config, tools)?
    };

    if !args.json {
        orch.on_event(print_progress);
    }

    debug!(provider = %config.default_provider, model = %config.default_model, "Running prompt");
    let result = orch.execute(args.prompt).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, config.orchestrator.streaming);
    }

    if let Some(error) = result.error {
        bail!(error);
    }
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if let Some(provider) = &args.provider {
        config.default_provider = provider.clone();
    }
    if let Some(model) = &args.model {
        config.default_model = model.clone();
    }
    if let Some(max) = args.max_iterations {
        config.orchestrator.max_iterations = max;
    }
    if args.stream {
        config.orchestrator.streaming = true;
    }
}

/// Answers once without calling any API.
fn dry_run_provider(prompt: &str) -> Arc<dyn ModelProvider> {
    Arc::new(ScriptedProvider::new(vec![
        Completion::text(format!("[dry run] {prompt}")).with_usage(
            u32::try_from(prompt.len() / 4).unwrap_or(u32::MAX),
            8,
        ),
    ]))
}

/// Progress goes to stderr; streamed text to stdout.
fn print_progress(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Chunk { content, .. } => {
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
        OrchestratorEvent::ToolCall {
            name, arguments, ..
        } => eprintln!("  -> {name} {arguments}"),
        OrchestratorEvent::ToolResult {
            name,
            success,
            output,
            ..
        } => {
            let status = if *success { "ok" } else { "failed" };
            eprintln!("  <- {name} {status}: {}", preview(output, 120));
        }
        _ => {}
    }
}

fn print_result(result: &ExecutionResult, streamed: bool) {
    if result.success {
        if streamed {
            println!();
        } else {
            println!("{}", result.text());
        }
    }

    let cost = &result.cost_tracking;
    eprintln!();
    eprintln!(
        "  iterations: {}  tokens: {} in / {} out  tool calls: {}  est. cost: ${:.6}",
        result.iterations, cost.input_tokens, cost.output_tokens, cost.tool_calls, cost.estimated_cost
    );
    if !result.tool_calls_used.is_empty() {
        eprintln!("  tools used: {}", result.tool_calls_used.join(", "));
    }
}

/// First `max` characters, on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
    if flat.chars().count() > max {
        format!("{}...", flat.chars().take(max).collect::<String>())
    } else {
        flat
    }
}
