//! Configuration module for loading TOML config files.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::DebateError;
use crate::ledger::DEFAULT_TOKEN_LIMIT;
use crate::prompt::{DEFAULT_TURN_TEMPLATE, PromptBuilder};

/// Root configuration structure. Every section is optional in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub quota: QuotaConfig,
    pub prompts: PromptsConfig,
}

/// Settings for calls to the generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model name sent with each request.
    pub model: String,
    /// Upper bound on completion tokens for one turn.
    pub max_tokens_per_turn: u32,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Attempts per generation call before giving up.
    pub max_retries: u32,
    /// Extra attempts when a turn sanitizes to nothing.
    pub empty_response_retries: u32,
    pub accept_invalid_certs: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens_per_turn: 500,
            timeout_secs: 120,
            connect_timeout_secs: 30,
            max_retries: 3,
            empty_response_retries: 1,
            accept_invalid_certs: false,
        }
    }
}

/// Quota settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Daily limit given to accounts seen for the first time.
    pub default_limit: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_TOKEN_LIMIT,
        }
    }
}

/// Prompt and presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Turn template; see [`DEFAULT_TURN_TEMPLATE`] for placeholders.
    pub turn_template: String,
    /// Shown in place of a turn that sanitized to nothing.
    pub placeholder: Option<String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            turn_template: DEFAULT_TURN_TEMPLATE.to_string(),
            placeholder: Some("(No response generated)".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DebateError> {
        if self.quota.default_limit == 0 {
            return Err(DebateError::ConfigError(
                "quota.default_limit must be greater than zero".to_string(),
            ));
        }
        if self.generation.max_tokens_per_turn == 0 {
            return Err(DebateError::ConfigError(
                "generation.max_tokens_per_turn must be greater than zero".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(DebateError::ConfigError(
                "generation.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Prompt builder using the configured template.
    pub fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(self.prompts.turn_template.clone())
    }
}
