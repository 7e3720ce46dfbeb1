//! Minimal client for the Replicate predictions API
//!
//! Only what the producer and critic need: create a prediction, wait for it
//! to settle, and download the files it points at.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Replicate API base URL
pub const REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

#[derive(Error, Debug)]
pub enum ReplicateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Replicate returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Prediction {id} ended with status '{status}': {error}")]
    PredictionFailed {
        id: String,
        status: String,
        error: String,
    },

    #[error("Prediction {id} did not finish within {waited:?}")]
    TimedOut { id: String, waited: Duration },

    #[error("Invalid model reference '{0}', expected owner/name[:version]")]
    InvalidModel(String),
}

/// `owner/name[:version]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl FromStr for ModelRef {
    type Err = ReplicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, version) = match s.split_once(':') {
            Some((path, version)) if !version.is_empty() => (path, Some(version.to_string())),
            Some(_) => return Err(ReplicateError::InvalidModel(s.to_string())),
            None => (s, None),
        };
        match path.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    version,
                })
            }
            _ => Err(ReplicateError::InvalidModel(s.to_string())),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(ref version) = self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

/// Configuration for the Replicate client
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub base_url: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Give up on a prediction after this long
    pub max_wait: Duration,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            base_url: REPLICATE_API_URL.to_string(),
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(600),
        }
    }
}

impl ReplicateConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn error_text(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "no error message".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Replicate API client
pub struct ReplicateClient {
    http: Client,
    api_token: String,
    config: ReplicateConfig,
}

impl ReplicateClient {
    pub fn new(api_token: impl Into<String>, config: ReplicateConfig) -> Result<Self, ReplicateError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_token: api_token.into(),
            config,
        })
    }

    /// Run a model and wait for its output
    pub async fn run(&self, model: &ModelRef, input: Value) -> Result<Value, ReplicateError> {
        let (url, body) = match model.version {
            Some(ref version) => (
                format!("{}/predictions", self.config.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!(
                    "{}/models/{}/{}/predictions",
                    self.config.base_url, model.owner, model.name
                ),
                json!({ "input": input }),
            ),
        };

        debug!(model = %model, "Creating prediction");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction: Prediction = Self::check(response).await?.json().await?;

        let started = Instant::now();
        while !prediction.is_terminal() {
            if started.elapsed() >= self.config.max_wait {
                return Err(ReplicateError::TimedOut {
                    id: prediction.id,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
            prediction = self.fetch(&prediction).await?;
        }

        info!(
            model = %model,
            id = %prediction.id,
            status = %prediction.status,
            "Prediction finished"
        );

        if prediction.status == "succeeded" {
            Ok(prediction.output.unwrap_or(Value::Null))
        } else {
            Err(ReplicateError::PredictionFailed {
                error: prediction.error_text(),
                id: prediction.id,
                status: prediction.status,
            })
        }
    }

    /// Download a file produced by a prediction
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ReplicateError> {
        debug!(url, "Downloading output");
        let response = self.http.get(url).send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn fetch(&self, prediction: &Prediction) -> Result<Prediction, ReplicateError> {
        let url = prediction
            .urls
            .as_ref()
            .and_then(|u| u.get.clone())
            .unwrap_or_else(|| format!("{}/predictions/{}", self.config.base_url, prediction.id));

        debug!(id = %prediction.id, status = %prediction.status, "Polling prediction");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ReplicateError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReplicateError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
