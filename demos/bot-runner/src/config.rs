//! Runner configuration file.

use std::{fs, path::Path};

use anyhow::Context;
use judge_protocol::SessionConfig;
use serde::Deserialize;

/// Bot-agent host command.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Shell-quoted command line of the host process.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments appended to `command`.
    #[serde(default)]
    pub params: Vec<String>,
}

/// Top-level runner configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl RunnerConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    /// Returns error if the document is invalid TOML or holds invalid values.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).context("invalid runner config")?;
        config
            .session
            .validate()
            .context("invalid [session] config")?;
        Ok(config)
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}
