use thiserror::Error;

use imageloops_agent::PromptError;
use imageloops_critic::ScoreRange;

/// Reasons a run refuses to start
#[derive(Error, Debug, PartialEq)]
pub enum LoopError {
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(#[from] PromptError),

    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),

    #[error("Score threshold {threshold} is outside the score range {range}")]
    ThresholdOutOfRange { threshold: f64, range: ScoreRange },
}
