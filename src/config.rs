// SPDX-License-Identifier: MIT

//! Runtime settings read from the environment
//!
//! Call `dotenv::dotenv()` first to pick up a local `.env` file.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::adk::error::FlowError;
use crate::adk::model::ollama::DEFAULT_BASE_URL;
use crate::workflow::graph::DEFAULT_MAX_STEPS;

pub const DEFAULT_MODEL: &str = "llama3-groq-tool-use";
pub const DEFAULT_ALT_MODEL: &str = "llama2-uncensored";
/// Model name that resolves to [`Settings::model`]
pub const PRIMARY_MODEL_ALIAS: &str = "primary";
/// Model name that resolves to [`Settings::alt_model`]
pub const ALT_MODEL_ALIAS: &str = "alternative";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_COMPARISON_MODELS: &str = "llama2-uncensored,deepseek-r1:8b,llama3-groq-tool-use";

/// Sampling temperature presets
///
/// Workflow files may name a preset instead of a number, e.g.
/// `temperature: precise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperature {
    Creative,
    Balanced,
    Precise,
}

impl Temperature {
    pub fn value(self) -> f32 {
        match self {
            Temperature::Creative => 0.7,
            Temperature::Balanced => 0.5,
            Temperature::Precise => 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub base_url: String,
    pub model: String,
    pub alt_model: String,
    pub comparison_models: Vec<String>,
    pub embedding_model: String,
    pub timeout: Duration,
    pub extended_timeout: Duration,
    pub max_steps: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            alt_model: DEFAULT_ALT_MODEL.to_string(),
            comparison_models: split_list(DEFAULT_COMPARISON_MODELS),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            extended_timeout: Duration::from_secs(120),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl Settings {
    /// Read settings from process environment variables
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FlowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            base_url: get("OLLAMA_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            model: get("KINETIC_MODEL").unwrap_or(defaults.model),
            alt_model: get("KINETIC_ALT_MODEL").unwrap_or(defaults.alt_model),
            comparison_models: get("KINETIC_COMPARISON_MODELS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.comparison_models),
            embedding_model: get("KINETIC_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            timeout: parse_var::<u64>("KINETIC_TIMEOUT_SECS", get("KINETIC_TIMEOUT_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            extended_timeout: parse_var::<u64>(
                "KINETIC_EXTENDED_TIMEOUT_SECS",
                get("KINETIC_EXTENDED_TIMEOUT_SECS"),
            )?
            .map(Duration::from_secs)
            .unwrap_or(defaults.extended_timeout),
            max_steps: parse_var("KINETIC_MAX_STEPS", get("KINETIC_MAX_STEPS"))?
                .unwrap_or(defaults.max_steps),
        })
    }

    /// Map the `primary` / `alternative` aliases to the configured model
    /// names; any other name is returned unchanged
    pub fn resolve_model(&self, name: &str) -> String {
        match name {
            PRIMARY_MODEL_ALIAS => self.model.clone(),
            ALT_MODEL_ALIAS => self.alt_model.clone(),
            other => other.to_string(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, FlowError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| FlowError::config(format!("{} has invalid value '{}'", key, v)))
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
