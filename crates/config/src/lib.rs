//! Configuration management for the regulation navigator
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (REGNAV__ prefix, `__` as section separator)
//!
//! Every retrieval calibration constant (fusion weights, boosts, confidence
//! thresholds) is a setting with its default in [`constants`].

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, ChunkingConfig, EncoderConfig, GateConfig, IndexConfig,
    ObservabilityConfig, PlannerConfig, RetrievalConfig, RuntimeEnvironment, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingField(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
