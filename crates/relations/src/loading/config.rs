//! Eager loading configuration

use std::env;

use crate::error::{ModelError, ModelResult};

/// Environment variable holding the maximum relation path depth
pub const MAX_DEPTH_ENV: &str = "ELIF_EAGER_MAX_DEPTH";

/// Environment variable enabling SQL logging of every relation query
pub const LOG_QUERIES_ENV: &str = "ELIF_EAGER_LOG_QUERIES";

/// Configuration for eager loading operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerLoadConfig {
    /// Maximum number of segments in one relation path
    pub max_depth: usize,
    /// Log the generated SQL of every relation query at debug level
    pub log_queries: bool,
}

impl Default for EagerLoadConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            log_queries: false,
        }
    }
}

impl EagerLoadConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> ModelResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ModelResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_depth = match lookup(MAX_DEPTH_ENV) {
            Some(value) => value.trim().parse::<usize>().map_err(|_| {
                ModelError::Configuration(format!(
                    "Invalid value '{}' for {}: expected a positive integer",
                    value, MAX_DEPTH_ENV
                ))
            })?,
            None => defaults.max_depth,
        };

        let log_queries = match lookup(LOG_QUERIES_ENV) {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                ModelError::Configuration(format!(
                    "Invalid value '{}' for {}: expected true or false",
                    value, LOG_QUERIES_ENV
                ))
            })?,
            None => defaults.log_queries,
        };

        let config = Self { max_depth, log_queries };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ModelResult<()> {
        if self.max_depth == 0 {
            return Err(ModelError::Configuration(
                "Eager load max_depth cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
