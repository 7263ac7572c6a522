//! SimpleBrain - HTTP agent front end for a local llama.cpp model runner
//!
//! This crate provides:
//! - A process invoker that shells out to the llama.cpp CLI with a hard timeout
//! - Extraction of `[CMD]...[/CMD]` directives from model output
//! - An execution gate that keeps directive execution disabled unless configured
//! - REST API and HTTP client for the CLI front ends

pub mod api;
pub mod client;
pub mod extract;
pub mod gate;
pub mod runner;

pub use api::{create_router, ApiState};
pub use extract::{extract, CommandCandidate};
pub use gate::{ExecutionGate, ExecutionResult};
pub use runner::{InferenceOutcome, LlamaCppRunner, ModelRunner};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while assembling configuration at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("MODEL_PATH environment variable not set")]
    MissingModelPath,

    #[error("Model file not found at {0}")]
    ModelNotFound(PathBuf),

    #[error("Invalid API_PORT value '{0}'")]
    InvalidPort(String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Whether `[CMD]` directives found in model output may be run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    #[default]
    Disabled,
    /// Runs extracted directives through `sh -c` with no sandbox. Unsafe.
    Enabled,
}

/// Configuration for a single agent server instance
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Path to the model weights (normally from MODEL_PATH)
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Port to listen on
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Instance name reported by /health
    #[serde(default = "default_unknown")]
    pub instance_name: String,

    /// Descriptive model type reported by /health
    #[serde(default = "default_unknown")]
    pub model_type: String,

    /// Directive execution policy
    #[serde(default)]
    pub execution_policy: ExecutionPolicy,

    /// Timeout for a gated command when execution is enabled
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Model runner settings
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Settings for the llama.cpp invocation
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Candidate executable locations, probed in order
    #[serde(default = "default_executable_paths")]
    pub executable_paths: Vec<PathBuf>,

    /// Maximum tokens to generate (-n)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (--temp)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Context size (-c)
    #[serde(default = "default_context_size")]
    pub context_size: u32,

    /// Batch size (-b)
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Thread count (-t)
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Wall-clock limit for one inference call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_port() -> u16 { 5000 }
fn default_unknown() -> String { "unknown".to_string() }
fn default_command_timeout_secs() -> u64 { 30 }
fn default_max_tokens() -> u32 { 512 }
fn default_temperature() -> f32 { 0.7 }
fn default_context_size() -> u32 { 2048 }
fn default_batch_size() -> u32 { 1 }
fn default_threads() -> u32 { 4 }
fn default_timeout_secs() -> u64 { 60 }

fn default_executable_paths() -> Vec<PathBuf> {
    [
        "/app/workspace/projects/llama.cpp/main",
        "/app/workspace/llama.cpp/main",
        "/app/workspace/llama.cpp/build/bin/main",
        "/usr/local/bin/llama-main",
        "llama-main",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            executable_paths: default_executable_paths(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            context_size: default_context_size(),
            batch_size: default_batch_size(),
            threads: default_threads(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            api_port: default_api_port(),
            instance_name: default_unknown(),
            model_type: default_unknown(),
            execution_policy: ExecutionPolicy::default(),
            command_timeout_secs: default_command_timeout_secs(),
            inference: InferenceConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from a TOML file, or start from defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply MODEL_PATH, API_PORT, INSTANCE_NAME and MODEL_TYPE overrides
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_vars<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("MODEL_PATH").filter(|p| !p.trim().is_empty()) {
            self.model_path = Some(PathBuf::from(path));
        }

        if let Some(port) = var("API_PORT") {
            self.api_port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        if let Some(name) = var("INSTANCE_NAME") {
            self.instance_name = name;
        }

        if let Some(model_type) = var("MODEL_TYPE") {
            self.model_type = model_type;
        }

        Ok(self)
    }

    /// Startup checks: the model path must be configured and exist
    pub fn validate(&self) -> Result<&Path, ConfigError> {
        let path = self
            .model_path
            .as_deref()
            .ok_or(ConfigError::MissingModelPath)?;

        if !path.exists() {
            return Err(ConfigError::ModelNotFound(path.to_path_buf()));
        }

        Ok(path)
    }
}
