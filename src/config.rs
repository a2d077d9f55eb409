use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::sandbox::SandboxSpec;

const CONFIG_FILE: &str = "swea.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Sandbox container configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image to run the sandbox from.
    #[serde(default = "default_image")]
    pub image: String,

    /// Container name; also the reuse key. At most one running sandbox
    /// exists per name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Default working directory for commands inside the sandbox.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            name: default_name(),
            working_dir: default_working_dir(),
        }
    }
}

impl SandboxConfig {
    pub fn to_spec(&self) -> SandboxSpec {
        SandboxSpec {
            image: self.image.clone(),
            name: self.name.clone(),
            working_dir: self.working_dir.clone(),
        }
    }
}

/// Agent task configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Working directory for agent tasks (the persistent workspace).
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Per-command wait before the agent is considered stuck.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Retries after a reap sweep before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            command_timeout_secs: default_command_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl AgentConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

// Default value functions
fn default_image() -> String {
    "ubuntu:24.04".to_string()
}

fn default_name() -> String {
    "swea".to_string()
}

fn default_working_dir() -> String {
    "/root".to_string()
}

fn default_workdir() -> String {
    "/root/workspace".to_string()
}

fn default_command_timeout_secs() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    1
}

impl Config {
    /// Load configuration from file, using defaults if not found
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }
}
