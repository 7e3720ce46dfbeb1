use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use imageloops_critic::{Critique, CritiqueParseError};
use imageloops_storage::StoreError;

use crate::{ImageArtifact, ReplicateError};

/// Errors raised while producing an image
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Image service error: {0}")]
    Service(#[from] ReplicateError),

    #[error("Image service returned no usable output")]
    EmptyOutput,

    #[error("Failed to store image: {0}")]
    Store(#[from] StoreError),

    #[error("Image generation failed: {0}")]
    Failed(String),
}

/// Errors raised while critiquing an image
#[derive(Error, Debug)]
pub enum CritiqueError {
    #[error("Cannot read artifact {}: {source}", .path.display())]
    UnreadableArtifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Critic service error: {0}")]
    Service(#[from] ReplicateError),

    #[error("Critic service returned no usable output")]
    EmptyOutput,

    #[error("Unparseable critique: {0}")]
    Parse(#[from] CritiqueParseError),

    #[error("Critique failed: {0}")]
    Failed(String),
}

/// Turns a prompt into a persisted image
#[async_trait]
pub trait ImageProducer: Send + Sync {
    /// Human-readable name (e.g., the model identifier)
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<ImageArtifact, GenerationError>;
}

/// Scores an image against the prompt it should depict
#[async_trait]
pub trait ImageCritic: Send + Sync {
    /// Human-readable name (e.g., the model identifier)
    fn name(&self) -> &str;

    async fn critique(
        &self,
        artifact: &ImageArtifact,
        prompt: &str,
    ) -> Result<Critique, CritiqueError>;
}
