use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{
    action::{action_model::Action, executor::RetryPolicy},
    agent::{
        agent_model::LoopConfig,
        decision::{DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OLLAMA_MODEL},
    },
    driver::bridge::BridgeConfig,
};

pub const DEFAULT_CONFIG_PATH: &str = "app-use.yaml";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "app-use",
    version,
    about = "Drive a mobile app through Appium with an LLM agent"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Ollama API endpoint
    #[arg(long, global = true)]
    pub ollama_endpoint: Option<String>,

    /// Ollama model name
    #[arg(long, global = true)]
    pub ollama_model: Option<String>,

    /// Path to config file (default: app-use.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent loop until the task completes, fails or is cancelled
    Run {
        /// Natural-language task for the agent
        #[arg(long)]
        task: String,

        /// Override the step budget from the config file
        #[arg(long)]
        max_steps: Option<u32>,
    },

    /// Capture one snapshot of the current screen and print it
    Snapshot {
        #[arg(long, value_enum, default_value_t = SnapshotFormat::Text)]
        format: SnapshotFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SnapshotFormat {
    Text,
    Json,
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Optional YAML config file: `app-use.yaml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retries: RetryConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Helper process that speaks the bridge protocol.
    #[serde(default = "default_driver_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Passed through to the Appium session untouched.
    #[serde(default = "default_capabilities")]
    pub capabilities: Value,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command: default_driver_command(),
            args: Vec::new(),
            capabilities: default_capabilities(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_snapshot_ms")]
    pub snapshot_ms: u64,
    #[serde(default = "default_decision_ms")]
    pub decision_ms: u64,
    #[serde(default = "default_action_ms")]
    pub action_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            snapshot_ms: default_snapshot_ms(),
            decision_ms: default_decision_ms(),
            action_ms: default_action_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_two")]
    pub driver_timeout_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_three")]
    pub decision_attempts: u32,
    #[serde(default = "default_three")]
    pub snapshot_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            driver_timeout_attempts: 2,
            backoff_ms: default_backoff_ms(),
            decision_attempts: 3,
            snapshot_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_three")]
    pub max_failures: u32,
    #[serde(default = "default_memory_interval")]
    pub memory_interval: u32,
    /// JSONL event trace; omit to disable.
    #[serde(default)]
    pub trace_path: Option<String>,
    /// Actions run before the first decision.
    #[serde(default)]
    pub initial_actions: Vec<Action>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_failures: 3,
            memory_interval: default_memory_interval(),
            trace_path: None,
            initial_actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OllamaConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

// Serde default helpers
fn default_driver_command() -> String { "appium-bridge".to_string() }
fn default_capabilities() -> Value { Value::Object(Default::default()) }
fn default_snapshot_ms() -> u64 { 10_000 }
fn default_decision_ms() -> u64 { 120_000 }
fn default_action_ms() -> u64 { 15_000 }
fn default_backoff_ms() -> u64 { 250 }
fn default_two() -> u32 { 2 }
fn default_three() -> u32 { 3 }
fn default_max_steps() -> u32 { 100 }
fn default_memory_interval() -> u32 { 10 }

// ============================================================================
// Config File Loading
// ============================================================================

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
}

pub fn read_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    parse_config(&content)
}

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    match read_config(config_path) {
        Ok(config) => config,
        Err(ConfigError::Io { .. }) if path.is_none() => AppConfig::default(),
        Err(e) => {
            warn!(path = config_path, "using default config: {}", e);
            AppConfig::default()
        }
    }
}

// ============================================================================
// Config Builders (merge CLI args with config file)
// ============================================================================

impl AppConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout_attempts: self.retries.driver_timeout_attempts,
            backoff: Duration::from_millis(self.retries.backoff_ms),
            action_timeout: Duration::from_millis(self.timeouts.action_ms),
        }
    }

    /// CLI `--max-steps` wins over the file.
    pub fn loop_config(&self, max_steps: Option<u32>) -> LoopConfig {
        LoopConfig {
            max_steps: max_steps.unwrap_or(self.agent.max_steps),
            max_failures: self.agent.max_failures,
            snapshot_attempts: self.retries.snapshot_attempts,
            decision_attempts: self.retries.decision_attempts,
            snapshot_timeout: Duration::from_millis(self.timeouts.snapshot_ms),
            decision_timeout: Duration::from_millis(self.timeouts.decision_ms),
            retry: self.retry_policy(),
            memory_interval: self.agent.memory_interval,
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            program: self.driver.command.clone(),
            args: self.driver.args.clone(),
            capabilities: self.driver.capabilities.clone(),
        }
    }

    /// Resolve Ollama settings: CLI > config > defaults.
    pub fn ollama_settings(&self, endpoint: Option<&str>, model: Option<&str>) -> (String, String) {
        let endpoint = endpoint
            .or(self.ollama.endpoint.as_deref())
            .unwrap_or(DEFAULT_OLLAMA_ENDPOINT);
        let model = model
            .or(self.ollama.model.as_deref())
            .unwrap_or(DEFAULT_OLLAMA_MODEL);
        (endpoint.to_string(), model.to_string())
    }
}
