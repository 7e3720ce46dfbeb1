//! Run configuration for imageloops.
//!
//! Settings come from CLI flags, then `imageloops.toml` in the working
//! directory, then built-in defaults. Credentials and the output root come
//! from the environment (a `.env` file is loaded first).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use imageloops_agent::{ModelRef, DEFAULT_CRITIC_MODEL, DEFAULT_GENERATOR_MODEL};
use imageloops_core::{FailurePolicy, Strategy};
use imageloops_critic::{Aggregation, ScoreRange};

/// The config file name
pub const CONFIG_FILE_NAME: &str = "imageloops.toml";

pub const API_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";
pub const OUTPUT_FOLDER_ENV: &str = "OUTPUT_FOLDER";

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_THRESHOLD: f64 = 9.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Project-level configuration loaded from `imageloops.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Replicate model for image generation (`owner/name[:version]`)
    pub generator_model: Option<String>,
    /// Replicate model for critique (`owner/name[:version]`)
    pub critic_model: Option<String>,
    pub max_iterations: Option<usize>,
    pub threshold: Option<f64>,
    /// `fixed` or `refine`
    pub strategy: Option<String>,
    /// `mean`, `min` or `weighted`
    pub aggregation: Option<String>,
    /// Per-dimension weights for weighted aggregation
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Score used when the critic's answer has no readable score
    pub fallback_score: Option<f64>,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[retry]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content =
            std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;

        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;

        Ok(Some(config))
    }

    fn failure_policy(&self, retries: Option<u32>) -> FailurePolicy {
        let mut policy = FailurePolicy::retry(retries.or(self.retry.max_retries).unwrap_or(0));
        if let Some(ms) = self.retry.initial_backoff_ms {
            policy.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry.max_backoff_ms {
            policy.max_backoff = Duration::from_millis(ms);
        }
        policy
    }
}

/// Values given on the command line; `None` means not given
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub max_iterations: Option<usize>,
    pub threshold: Option<f64>,
    pub strategy: Option<Strategy>,
    pub aggregation: Option<Aggregation>,
    pub retries: Option<u32>,
    pub fallback_score: Option<f64>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub api_token: String,
    pub output_root: PathBuf,
    pub generator_model: ModelRef,
    pub critic_model: ModelRef,
    pub max_iterations: usize,
    pub threshold: f64,
    pub strategy: Strategy,
    pub aggregation: Aggregation,
    pub weights: HashMap<String, f64>,
    pub fallback_score: Option<f64>,
    pub failure_policy: FailurePolicy,
}

impl RunConfig {
    /// Merge CLI overrides, the project file and the environment.
    /// Priority: CLI > file > default
    pub fn resolve(
        overrides: Overrides,
        file: Option<ProjectConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();

        let api_token = env(API_TOKEN_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(API_TOKEN_ENV))?;

        let output_root = match overrides.output_dir {
            Some(dir) => dir,
            None => env(OUTPUT_FOLDER_ENV)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .ok_or(ConfigError::MissingEnv(OUTPUT_FOLDER_ENV))?,
        };

        let generator_model = parse_model(
            "generator_model",
            file.generator_model.as_deref().unwrap_or(DEFAULT_GENERATOR_MODEL),
        )?;
        let critic_model = parse_model(
            "critic_model",
            file.critic_model.as_deref().unwrap_or(DEFAULT_CRITIC_MODEL),
        )?;

        let strategy = match (overrides.strategy, file.strategy.as_deref()) {
            (Some(strategy), _) => strategy,
            (None, Some(s)) => s.parse().map_err(|message| ConfigError::Invalid {
                field: "strategy",
                message,
            })?,
            (None, None) => Strategy::default(),
        };

        let aggregation = match (overrides.aggregation, file.aggregation.as_deref()) {
            (Some(aggregation), _) => aggregation,
            (None, Some(s)) => s.parse().map_err(|message| ConfigError::Invalid {
                field: "aggregation",
                message,
            })?,
            (None, None) => Aggregation::default(),
        };

        let fallback_score = overrides.fallback_score.or(file.fallback_score);
        if let Some(score) = fallback_score {
            let range = ScoreRange::default();
            if !range.contains(score) {
                return Err(ConfigError::Invalid {
                    field: "fallback_score",
                    message: format!("{} is outside the score range {}", score, range),
                });
            }
        }

        let failure_policy = file.failure_policy(overrides.retries);

        Ok(Self {
            api_token,
            output_root,
            generator_model,
            critic_model,
            max_iterations: overrides
                .max_iterations
                .or(file.max_iterations)
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
            threshold: overrides
                .threshold
                .or(file.threshold)
                .unwrap_or(DEFAULT_THRESHOLD),
            strategy,
            aggregation,
            weights: file.weights,
            fallback_score,
            failure_policy,
        })
    }
}

fn parse_model(field: &'static str, value: &str) -> Result<ModelRef, ConfigError> {
    value.parse().map_err(|e: imageloops_agent::ReplicateError| ConfigError::Invalid {
        field,
        message: e.to_string(),
    })
}
