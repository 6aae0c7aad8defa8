// SPDX-License-Identifier: MIT

//! Engine configuration loaded from the environment

use crate::error::SwitchyardError;
use std::env;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://switchyard.db?mode=rwc";
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runtime settings for the store, runner and service
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// sqlx connection string for the SQLite graph store
    pub database_url: String,
    /// Iteration budget for a single traversal
    pub max_iterations: u32,
    /// Caller-level timeout around one traversal; `None` disables it
    pub timeout: Option<Duration>,
    /// Remote node executor endpoint
    pub executor_url: Option<String>,
    /// Keep assembled graph snapshots between executions
    pub cache_graphs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            executor_url: None,
            cache_graphs: false,
        }
    }
}

impl EngineConfig {
    /// Load from `SWITCHYARD_*` environment variables
    pub fn from_env() -> Result<Self, SwitchyardError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SwitchyardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SWITCHYARD_DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(raw) = lookup("SWITCHYARD_MAX_ITERATIONS") {
            let max: u32 = raw.trim().parse().map_err(|_| {
                SwitchyardError::config(format!("SWITCHYARD_MAX_ITERATIONS is not a number: {}", raw))
            })?;
            config.max_iterations = max;
        }

        if let Some(raw) = lookup("SWITCHYARD_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                SwitchyardError::config(format!("SWITCHYARD_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(url) = lookup("SWITCHYARD_EXECUTOR_URL") {
            let url = url.trim().to_string();
            config.executor_url = (!url.is_empty()).then_some(url);
        }

        if let Some(raw) = lookup("SWITCHYARD_CACHE_GRAPHS") {
            config.cache_graphs = parse_flag(&raw).ok_or_else(|| {
                SwitchyardError::config(format!("SWITCHYARD_CACHE_GRAPHS is not a boolean: {}", raw))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SwitchyardError> {
        if self.max_iterations == 0 {
            return Err(SwitchyardError::config("max iterations must be greater than 0"));
        }
        if self.database_url.trim().is_empty() {
            return Err(SwitchyardError::config("database url must not be empty"));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
