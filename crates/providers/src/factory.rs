//! Provider factory: turns a [`ModelConfig`] into a live backend.

use std::sync::Arc;

use orcha_core::error::ProviderError;
use orcha_core::provider::{ModelConfig, ModelProvider};

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::{OLLAMA_URL, OPENAI_URL, OPENROUTER_URL, OpenAiCompatProvider};

/// Default endpoint for well-known OpenAI-compatible providers.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some(OPENAI_URL),
        "openrouter" => Some(OPENROUTER_URL),
        "ollama" => Some(OLLAMA_URL),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        _ => None,
    }
}

/// Providers that run locally and need no API key.
pub fn is_local(provider: &str) -> bool {
    matches!(provider, "ollama" | "vllm")
}

/// Build a provider from an explicit model descriptor.
///
/// Unknown provider names work as long as `base_url` is set; they are
/// treated as OpenAI-compatible.
pub fn build_provider(config: &ModelConfig) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    let name = config.provider.as_str();

    let require_key = || {
        config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured(format!("No API key for provider '{name}'")))
    };

    if name == "anthropic" {
        let mut provider = AnthropicProvider::new(require_key()?)?;
        if let Some(url) = &config.base_url {
            provider = provider.with_base_url(url);
        }
        return Ok(Arc::new(provider));
    }

    let base_url = config
        .base_url
        .as_deref()
        .or_else(|| default_base_url(name))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider '{name}' and no base_url given"
            ))
        })?;

    let api_key = if is_local(name) {
        config.api_key.clone()
    } else {
        Some(require_key()?)
    };

    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)?))
}
