//! Environment-driven configuration.

use crate::error::{Result, SkiffError};
use crate::tools::bash::CommandPolicy;
use crate::tools::network_policy::NetworkPolicy;
use crate::tools::web_search::WebSearchConfig;

pub const ENV_API_KEY: &str = "SKIFF_API_KEY";
pub const ENV_BASE_URL: &str = "SKIFF_BASE_URL";
pub const ENV_MODEL: &str = "SKIFF_MODEL";
pub const ENV_BASH_ALLOWLIST: &str = "SKIFF_BASH_ALLOWLIST";
pub const ENV_BASH_DENYLIST: &str = "SKIFF_BASH_DENYLIST";
pub const ENV_ALLOW_PRIVATE_EGRESS: &str = "SKIFF_ALLOW_PRIVATE_EGRESS";
pub const ENV_WEB_SEARCH_URL: &str = "OLLAMA_WEB_SEARCH_URL";
pub const ENV_WEB_SEARCH_API_KEY: &str = "OLLAMA_WEB_SEARCH_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Connection settings for the completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Load `.env` if one is present. Missing files are not an error; malformed
/// ones are.
pub fn load_env_files_if_present() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(SkiffError::Configuration(format!(
            "failed to load .env: {err}"
        ))),
    }
}

pub fn resolve_llm_config() -> Result<LlmConfig> {
    llm_config_from(
        env_value(ENV_API_KEY),
        env_value(ENV_BASE_URL),
        env_value(ENV_MODEL),
    )
}

fn llm_config_from(
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
) -> Result<LlmConfig> {
    let api_key = api_key.ok_or_else(|| {
        SkiffError::Configuration(format!("{ENV_API_KEY} is required but not set"))
    })?;

    Ok(LlmConfig {
        api_key,
        base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
        model: model.unwrap_or_else(|| DEFAULT_MODEL.into()),
    })
}

pub fn resolve_command_policy() -> Result<CommandPolicy> {
    let allow = env_value(ENV_BASH_ALLOWLIST).unwrap_or_default();
    let deny = env_value(ENV_BASH_DENYLIST).unwrap_or_default();
    CommandPolicy::from_lists(&allow, &deny)
}

pub fn resolve_network_policy() -> NetworkPolicy {
    NetworkPolicy::new(env_flag(ENV_ALLOW_PRIVATE_EGRESS))
}

pub fn resolve_web_search_config() -> WebSearchConfig {
    let mut config = WebSearchConfig::default();
    if let Some(endpoint) = env_value(ENV_WEB_SEARCH_URL) {
        config.endpoint = endpoint;
    }
    config.api_key = env_value(ENV_WEB_SEARCH_API_KEY);
    config
}

/// A set, non-blank environment value.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> bool {
    env_value(name)
        .map(|value| parse_flag(&value))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
