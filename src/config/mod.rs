mod types;

pub use types::*;

use crate::{Error, Result};
use std::env;
use tracing::debug;

pub async fn load() -> Result<Config> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

    debug!("Loading configuration from: {}", config_path);

    let config_str = tokio::fs::read_to_string(&config_path).await?;
    let mut config = parse(&config_str)?;

    if let Ok(token) = env::var("INFERENCE_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            config.inference.access_token = Some(token);
        }
    }

    Ok(config)
}

pub fn parse(config_str: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(config_str)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.inference.base_url.trim().is_empty() {
        return Err(Error::config("inference.base_url must not be empty"));
    }
    if config.retry.max_attempts == 0 {
        return Err(Error::config("retry.max_attempts must be at least 1"));
    }
    if config.download.max_attempts == 0 {
        return Err(Error::config("download.max_attempts must be at least 1"));
    }
    if config.inference.request_timeout_ms == 0 {
        return Err(Error::config("inference.request_timeout_ms must be positive"));
    }
    if config.inference.max_denoise_steps == 0 {
        return Err(Error::config("inference.max_denoise_steps must be positive"));
    }
    if let Some(model3d) = &config.model3d {
        if model3d.base_url.trim().is_empty() {
            return Err(Error::config("model3d.base_url must not be empty"));
        }
    }
    Ok(())
}
