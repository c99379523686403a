//! TOML-based configuration for the research server
//!
//! Configuration is read once at startup from a TOML file (`finresearch.toml`
//! by default), adjusted by a handful of environment variables, validated,
//! and then shared read-only for the lifetime of the process.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//!
//! [pipeline]
//! program = "python3"
//! args = ["local_orchestrator.py"]
//! timeout_secs = 300
//! ```

use crate::research::pipeline::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS};
use crate::research::ResearchQuery;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "finresearch.toml";

/// Root configuration structure loaded from finresearch.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            cors_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============= Pipeline Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Executable that runs the research pipeline
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the query
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Extra environment variables for the pipeline process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["local_orchestrator.py".to_string()]
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_max_query_chars() -> usize {
    ResearchQuery::DEFAULT_MAX_CHARS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            max_query_chars: default_max_query_chars(),
            env: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnvVar { name: String, value: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ResearchConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Like [`ResearchConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::FileNotFound(missing)) => {
                info!(
                    "Configuration file {} not found, using defaults",
                    missing.display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognised variables: `HOST`, `PORT`, `RESEARCH_PIPELINE_PROGRAM`,
    /// `RESEARCH_PIPELINE_TIMEOUT_SECS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(program) = lookup("RESEARCH_PIPELINE_PROGRAM") {
            self.pipeline.program = program;
        }
        if let Some(secs) = lookup("RESEARCH_PIPELINE_TIMEOUT_SECS") {
            self.pipeline.timeout_secs = parse_env("RESEARCH_PIPELINE_TIMEOUT_SECS", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.host must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        for origin in &self.server.cors_origins {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "server.cors_origins contains an invalid origin: '{}'",
                    origin
                )));
            }
        }
        if self.pipeline.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.program must not be empty".to_string(),
            ));
        }
        if self.pipeline.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.max_output_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_output_bytes must be greater than zero".to_string(),
            ));
        }
        if self.pipeline.max_query_chars == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_query_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
        name: name.to_string(),
        value: value.to_string(),
    })
}
