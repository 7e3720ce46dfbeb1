use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("Prompt must not be empty")]
    Empty,
}

/// Text description of the desired image. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Result<Self, PromptError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PromptError::Empty);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `max_chars` characters, for log lines
    pub fn preview(&self, max_chars: usize) -> String {
        self.0.chars().take(max_chars).collect()
    }
}

impl TryFrom<String> for Prompt {
    type Error = PromptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Prompt> for String {
    fn from(prompt: Prompt) -> Self {
        prompt.0
    }
}

impl AsRef<str> for Prompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A generated image persisted to durable storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArtifact {
    /// Where the image bytes were written
    pub path: PathBuf,
    /// Remote URL the image was downloaded from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Prompt the image was generated from
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl ImageArtifact {
    pub fn new(path: PathBuf, prompt: impl Into<String>) -> Self {
        Self {
            path,
            source_url: None,
            prompt: prompt.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_rejects_blank() {
        assert_eq!(Prompt::new(""), Err(PromptError::Empty));
        assert_eq!(Prompt::new("   \n"), Err(PromptError::Empty));
        assert_eq!(Prompt::new("fog").unwrap().as_str(), "fog");
    }

    #[test]
    fn test_prompt_deserialize_validates() {
        let ok: Prompt = serde_json::from_str("\"rain\"").unwrap();
        assert_eq!(ok.as_str(), "rain");
        assert!(serde_json::from_str::<Prompt>("\"\"").is_err());
    }

    #[test]
    fn test_prompt_preview() {
        let prompt = Prompt::new("In Houston at 8pm, Heavy rain").unwrap();
        assert_eq!(prompt.preview(10), "In Houston");
    }
}
