mod artifact;
mod critic;
mod producer;
pub mod replicate;
mod traits;

pub use artifact::{ImageArtifact, Prompt, PromptError};
pub use critic::{ReplicateCritic, DEFAULT_CRITIC_MODEL};
pub use producer::{ReplicateProducer, DEFAULT_GENERATOR_MODEL};
pub use replicate::{ModelRef, ReplicateClient, ReplicateConfig, ReplicateError};
pub use traits::{CritiqueError, GenerationError, ImageCritic, ImageProducer};
