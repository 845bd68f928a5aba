//! `orcha pricing`: show per-1K-token rates.

use anyhow::Context;
use orcha_config::AppConfig;
use orcha_core::ModelPricing;
use orcha_telemetry::PricingTable;

pub fn run(model: Option<&str>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let table = config.pricing_table();

    match model {
        Some(model) => {
            let (pricing, known) = resolve(&table, &config.default_provider, model);
            println!("Model:   {model}");
            println!("Input:   ${:.5} / 1K tokens", pricing.input_per_1k);
            println!("Output:  ${:.5} / 1K tokens", pricing.output_per_1k);
            if !known {
                println!("(no pricing data, using the fallback rate)");
            }
        }
        None => {
            println!("Model Pricing (USD per 1K tokens)");
            println!("{:<40} {:>10} {:>10}", "Model", "Input", "Output");
            let entries = table.entries();
            for (name, p) in &entries {
                println!(
                    "{:<40} {:>10.5} {:>10.5}",
                    name, p.input_per_1k, p.output_per_1k
                );
            }
            println!();
            println!("  {} models with pricing data", entries.len());
        }
    }

    Ok(())
}

/// Rates for a model, and whether they came from the table.
fn resolve(table: &PricingTable, provider: &str, model: &str) -> (ModelPricing, bool) {
    let known = table.get(&format!("{provider}/{model}")).is_some() || table.lookup(model).is_some();
    (table.resolve(provider, model), known)
}
