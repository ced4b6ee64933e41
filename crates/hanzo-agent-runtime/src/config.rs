//! Runtime-wide configuration
//!
//! [`AgentsConfig`] holds the defaults every run falls back to: the model
//! name, the turn limit, baseline model settings, tracing switches and the
//! provider credentials. It is loaded explicitly (environment, TOML string or
//! TOML file) and injected into the [`Runner`](crate::Runner), the
//! [`RunConfig`](crate::RunConfig) and the OpenAI provider.

use crate::errors::{AgentError, Result};
use crate::types::ModelSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default maximum turns for agent execution
pub const DEFAULT_MAX_TURNS: usize = 10;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Tracing switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub include_sensitive_data: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_sensitive_data: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_base: String,
    pub default_model: String,
    pub default_max_turns: usize,
    pub model_settings: ModelSettings,
    pub tracing: TracingConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_max_turns: DEFAULT_MAX_TURNS,
            model_settings: ModelSettings {
                temperature: Some(0.7),
                top_p: Some(1.0),
                frequency_penalty: Some(0.0),
                presence_penalty: Some(0.0),
                max_tokens: None,
                timeout: Some(60),
                stop: None,
            },
            tracing: TracingConfig::default(),
        }
    }
}

impl AgentsConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| AgentError::Configuration(format!("invalid agents config: {}", e)))
    }

    /// Load a TOML file and apply environment overrides on top
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)?.with_env_overrides()
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AgentError::Configuration(format!("cannot serialize agents config: {}", e)))
    }

    fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(base) = lookup("OPENAI_API_BASE") {
            self.api_base = base;
        }
        if let Some(model) = lookup("AGENTS_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(turns) = lookup("AGENTS_DEFAULT_MAX_TURNS") {
            self.default_max_turns = turns.trim().parse().map_err(|_| {
                AgentError::Configuration(format!("AGENTS_DEFAULT_MAX_TURNS is not a number: {}", turns))
            })?;
        }
        if let Some(enabled) = lookup("AGENTS_TRACING_ENABLED") {
            self.tracing.enabled = parse_bool(&enabled).ok_or_else(|| {
                AgentError::Configuration(format!("AGENTS_TRACING_ENABLED is not a boolean: {}", enabled))
            })?;
        }
        Ok(self)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
