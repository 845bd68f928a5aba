//! `orcha config`: print the effective configuration.

use anyhow::Context;
use orcha_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let toml_str = toml::to_string_pretty(&redacted(&config))?;
    println!("{toml_str}");
    Ok(())
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}

/// Copy of the config with every key replaced.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcha_config::ProviderConfig;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn keys_never_reach_the_output() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-top-secret".into());
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("sk-ant-secret".into()),
                api_url: Some("https://example.test".into()),
            },
        );

        let out = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!out.contains("secret"));
        assert!(out.contains(REDACTED));
        assert!(out.contains("https://example.test"));
    }
}
