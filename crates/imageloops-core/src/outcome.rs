use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use imageloops_agent::ImageArtifact;
use imageloops_critic::Critique;

use crate::IterationRecord;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ThresholdMet,
    MaxIterationsExhausted,
    GenerationFailure,
    CritiqueFailure,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThresholdMet => "threshold_met",
            Self::MaxIterationsExhausted => "max_iterations_exhausted",
            Self::GenerationFailure => "generation_failure",
            Self::CritiqueFailure => "critique_failure",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final outcome of a refinement run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// Aggregate score exceeded the threshold
    ThresholdMet {
        iterations: usize,
        artifact: ImageArtifact,
        critique: Critique,
        score: f64,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// Ran `max_iterations` times without exceeding the threshold
    MaxIterationsExhausted {
        iterations: usize,
        artifact: ImageArtifact,
        critique: Critique,
        score: f64,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// The producer failed; the critic was not called for this iteration
    GenerationFailure {
        iterations: usize,
        error: String,
        last_artifact: Option<ImageArtifact>,
        last_critique: Option<Critique>,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
    /// The critic failed on `artifact`, which stays on disk
    CritiqueFailure {
        iterations: usize,
        error: String,
        artifact: ImageArtifact,
        last_critique: Option<Critique>,
        history: Vec<IterationRecord>,
        total_duration_secs: f64,
    },
}

impl LoopOutcome {
    pub fn threshold_met(
        iterations: usize,
        artifact: ImageArtifact,
        critique: Critique,
        score: f64,
        history: Vec<IterationRecord>,
        duration: Duration,
    ) -> Self {
        Self::ThresholdMet {
            iterations,
            artifact,
            critique,
            score,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn max_iterations_exhausted(
        iterations: usize,
        artifact: ImageArtifact,
        critique: Critique,
        score: f64,
        history: Vec<IterationRecord>,
        duration: Duration,
    ) -> Self {
        Self::MaxIterationsExhausted {
            iterations,
            artifact,
            critique,
            score,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn generation_failure(
        iterations: usize,
        error: String,
        last_artifact: Option<ImageArtifact>,
        last_critique: Option<Critique>,
        history: Vec<IterationRecord>,
        duration: Duration,
    ) -> Self {
        Self::GenerationFailure {
            iterations,
            error,
            last_artifact,
            last_critique,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn critique_failure(
        iterations: usize,
        error: String,
        artifact: ImageArtifact,
        last_critique: Option<Critique>,
        history: Vec<IterationRecord>,
        duration: Duration,
    ) -> Self {
        Self::CritiqueFailure {
            iterations,
            error,
            artifact,
            last_critique,
            history,
            total_duration_secs: duration.as_secs_f64(),
        }
    }

    pub fn reason(&self) -> TerminationReason {
        match self {
            Self::ThresholdMet { .. } => TerminationReason::ThresholdMet,
            Self::MaxIterationsExhausted { .. } => TerminationReason::MaxIterationsExhausted,
            Self::GenerationFailure { .. } => TerminationReason::GenerationFailure,
            Self::CritiqueFailure { .. } => TerminationReason::CritiqueFailure,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            Self::ThresholdMet { iterations, .. }
            | Self::MaxIterationsExhausted { iterations, .. }
            | Self::GenerationFailure { iterations, .. }
            | Self::CritiqueFailure { iterations, .. } => *iterations,
        }
    }

    /// Latest artifact produced before the run ended
    pub fn final_artifact(&self) -> Option<&ImageArtifact> {
        match self {
            Self::ThresholdMet { artifact, .. }
            | Self::MaxIterationsExhausted { artifact, .. }
            | Self::CritiqueFailure { artifact, .. } => Some(artifact),
            Self::GenerationFailure { last_artifact, .. } => last_artifact.as_ref(),
        }
    }

    /// Latest critique produced before the run ended
    pub fn final_critique(&self) -> Option<&Critique> {
        match self {
            Self::ThresholdMet { critique, .. } | Self::MaxIterationsExhausted { critique, .. } => {
                Some(critique)
            }
            Self::GenerationFailure { last_critique, .. }
            | Self::CritiqueFailure { last_critique, .. } => last_critique.as_ref(),
        }
    }

    /// Aggregate score of the final critique, if one was scored
    pub fn final_score(&self) -> Option<f64> {
        match self {
            Self::ThresholdMet { score, .. } | Self::MaxIterationsExhausted { score, .. } => {
                Some(*score)
            }
            Self::GenerationFailure { history, .. } | Self::CritiqueFailure { history, .. } => {
                history.last().and_then(|r| r.aggregate_score)
            }
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::GenerationFailure { error, .. } | Self::CritiqueFailure { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }

    pub fn history(&self) -> &[IterationRecord] {
        match self {
            Self::ThresholdMet { history, .. }
            | Self::MaxIterationsExhausted { history, .. }
            | Self::GenerationFailure { history, .. }
            | Self::CritiqueFailure { history, .. } => history,
        }
    }

    /// Every artifact written during the run, in order
    pub fn artifact_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self
            .history()
            .iter()
            .map(|r| r.artifact.path.as_path())
            .collect();
        // The failing artifact may not have a history record yet
        if let Self::CritiqueFailure { artifact, .. } = self {
            if paths.last() != Some(&artifact.path.as_path()) {
                paths.push(&artifact.path);
            }
        }
        paths
    }

    pub fn total_duration_secs(&self) -> f64 {
        match self {
            Self::ThresholdMet {
                total_duration_secs,
                ..
            }
            | Self::MaxIterationsExhausted {
                total_duration_secs,
                ..
            }
            | Self::GenerationFailure {
                total_duration_secs,
                ..
            }
            | Self::CritiqueFailure {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::ThresholdMet { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ThresholdMet { .. } => 0,
            Self::MaxIterationsExhausted { .. } => 1,
            Self::GenerationFailure { .. } => 2,
            Self::CritiqueFailure { .. } => 3,
        }
    }
}
