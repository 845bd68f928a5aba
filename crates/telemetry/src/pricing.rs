//! Built-in pricing table for common LLM models.
//!
//! Prices are in USD per 1K tokens. Each model has an input and output
//! price. Custom pricing can be added at runtime via TOML config.

use orcha_core::ModelPricing;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Provider prefixes tried when a bare model name has no exact entry.
const PROVIDER_PREFIXES: &[&str] = &[
    "openai",
    "anthropic",
    "google",
    "mistral",
    "deepseek",
    "meta-llama",
];

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let defaults: &[(&str, f64, f64)] = &[
            // ── Anthropic ──────────────────────────────────────────────
            ("anthropic/claude-sonnet-4", 0.003, 0.015),
            ("anthropic/claude-opus-4", 0.015, 0.075),
            ("anthropic/claude-3-5-sonnet", 0.003, 0.015),
            ("anthropic/claude-3-5-haiku", 0.0008, 0.004),
            ("anthropic/claude-3-haiku", 0.00025, 0.00125),
            // ── OpenAI ─────────────────────────────────────────────────
            ("openai/gpt-4o", 0.0025, 0.01),
            ("openai/gpt-4o-mini", 0.00015, 0.0006),
            ("openai/gpt-4-turbo", 0.01, 0.03),
            ("openai/gpt-3.5-turbo", 0.0005, 0.0015),
            ("openai/o1", 0.015, 0.06),
            ("openai/o1-mini", 0.003, 0.012),
            ("openai/o3-mini", 0.0011, 0.0044),
            // ── Google ─────────────────────────────────────────────────
            ("google/gemini-2.0-flash", 0.0001, 0.0004),
            ("google/gemini-1.5-pro", 0.00125, 0.005),
            ("google/gemini-1.5-flash", 0.000075, 0.0003),
            // ── Meta (via OpenRouter) ──────────────────────────────────
            ("meta-llama/llama-3.1-70b", 0.00052, 0.00075),
            ("meta-llama/llama-3.1-8b", 0.000055, 0.000055),
            // ── Mistral ────────────────────────────────────────────────
            ("mistral/mistral-large", 0.002, 0.006),
            ("mistral/mistral-small", 0.0002, 0.0006),
            // ── DeepSeek ───────────────────────────────────────────────
            ("deepseek/deepseek-v3", 0.00027, 0.0011),
            ("deepseek/deepseek-r1", 0.00055, 0.00219),
        ];

        let prices = defaults
            .iter()
            .map(|&(name, input, output)| (name.to_string(), ModelPricing::new(input, output)))
            .collect();

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ModelPricing>> {
        self.prices.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up pricing by exact key. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.read().get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        self.write().insert(model.into(), pricing);
    }

    /// Find pricing for a model name.
    ///
    /// Tries exact match first, then common provider prefixes
    /// (`gpt-4o` → `openai/gpt-4o`), then the longest key whose bare name is
    /// a prefix of the model (`gpt-4o-mini-2024-07-18` matches `gpt-4o-mini`).
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.read();

        // 1. Exact match
        if let Some(p) = prices.get(model) {
            return Some(*p);
        }

        // 2. Common provider prefixes
        for prefix in PROVIDER_PREFIXES {
            if let Some(p) = prices.get(&format!("{prefix}/{model}")) {
                return Some(*p);
            }
        }

        // 3. Longest prefix match on the bare names
        let model_lower = model.to_lowercase();
        let bare_model = model_lower.rsplit('/').next().unwrap_or(&model_lower);

        let mut best: Option<(usize, ModelPricing)> = None;
        for (key, pricing) in prices.iter() {
            let bare_key = key.rsplit('/').next().unwrap_or(key).to_lowercase();
            if bare_model.starts_with(&bare_key)
                && best.is_none_or(|(len, _)| bare_key.len() > len)
            {
                best = Some((bare_key.len(), *pricing));
            }
        }

        best.map(|(_, p)| p)
    }

    /// Resolve the rates for a provider/model pair, falling back to the flat
    /// default rate.
    pub fn resolve(&self, provider: &str, model: &str) -> ModelPricing {
        self.get(&format!("{provider}/{model}"))
            .or_else(|| self.lookup(model))
            .unwrap_or_else(|| {
                tracing::debug!(provider, model, "No pricing entry, using fallback rate");
                ModelPricing::FALLBACK
            })
    }

    /// Compute cost for a model call using resolved rates.
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.lookup(model)
            .unwrap_or(ModelPricing::FALLBACK)
            .cost(input_tokens, output_tokens)
    }

    /// List all known model names, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// All entries, sorted by model name.
    pub fn entries(&self) -> Vec<(String, ModelPricing)> {
        let mut entries: Vec<_> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for PricingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingTable")
            .field("models", &self.len())
            .finish()
    }
}
