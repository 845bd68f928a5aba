//! LLM provider implementations for Orcha.
//!
//! All providers implement the `orcha_core::ModelProvider` trait.
//! [`build_provider`] selects the right one from a `ModelConfig`.

pub mod anthropic;
pub mod factory;
pub mod openai_compat;
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use factory::{build_provider, default_base_url, is_local};
pub use openai_compat::OpenAiCompatProvider;
pub use scripted::ScriptedProvider;

use orcha_core::error::ProviderError;
use tracing::warn;

/// Shared HTTP client settings for remote providers.
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))
}

/// Map non-success HTTP statuses onto [`ProviderError`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            Err(ProviderError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed(format!(
            "Invalid {provider} API key or insufficient permissions"
        ))),
        code => {
            let body = response.text().await.unwrap_or_default();
            warn!(provider, status = code, body = %body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: code,
                message: body,
            })
        }
    }
}
