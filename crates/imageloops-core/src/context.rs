use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use imageloops_agent::{ImageArtifact, Prompt};
use imageloops_critic::{Critique, ScoreRange};

use crate::error::LoopError;
use crate::state::{LoopPhase, PhaseEvent};

/// State owned by a single refinement run
#[derive(Debug, Clone)]
pub struct LoopContext {
    /// Original prompt; never changes during the run
    prompt: Prompt,
    /// Current iteration number (0-indexed)
    pub iteration: usize,
    pub max_iterations: usize,
    pub threshold: f64,
    phase: LoopPhase,
    latest_artifact: Option<ImageArtifact>,
    latest_critique: Option<Critique>,
    latest_score: Option<f64>,
    /// Every iteration that produced an artifact
    pub history: Vec<IterationRecord>,
    started_at: Instant,
}

/// Record of a single iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based
    pub iteration_number: usize,
    /// Prompt the producer was given
    pub prompt: String,
    pub artifact: ImageArtifact,
    pub critique: Option<Critique>,
    pub aggregate_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LoopContext {
    /// Validate the run parameters and set up fresh state
    pub fn new(
        prompt: &str,
        max_iterations: usize,
        threshold: f64,
        range: ScoreRange,
    ) -> Result<Self, LoopError> {
        let prompt = Prompt::new(prompt)?;
        if max_iterations == 0 {
            return Err(LoopError::InvalidMaxIterations(max_iterations));
        }
        if !range.contains(threshold) {
            return Err(LoopError::ThresholdOutOfRange { threshold, range });
        }

        Ok(Self {
            prompt,
            iteration: 0,
            max_iterations,
            threshold,
            phase: LoopPhase::default(),
            latest_artifact: None,
            latest_critique: None,
            latest_score: None,
            history: Vec::new(),
            started_at: Instant::now(),
        })
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Apply a phase transition
    pub fn advance(&mut self, event: PhaseEvent) {
        match self.phase.next(event) {
            Some(next) => {
                debug!(from = ?self.phase, to = ?next, iteration = self.iteration, "Phase change");
                self.phase = next;
            }
            None => warn!(phase = ?self.phase, event = ?event, "Ignoring invalid phase transition"),
        }
    }

    pub fn latest_artifact(&self) -> Option<&ImageArtifact> {
        self.latest_artifact.as_ref()
    }

    pub fn latest_critique(&self) -> Option<&Critique> {
        self.latest_critique.as_ref()
    }

    pub fn latest_score(&self) -> Option<f64> {
        self.latest_score
    }

    /// A new artifact supersedes the previous one along with its critique
    pub fn set_artifact(&mut self, artifact: ImageArtifact) {
        self.latest_artifact = Some(artifact);
        self.latest_critique = None;
        self.latest_score = None;
    }

    pub fn set_critique(&mut self, critique: Critique, score: Option<f64>) {
        self.latest_critique = Some(critique);
        self.latest_score = score;
    }

    pub fn push_record(&mut self, record: IterationRecord) {
        self.history.push(record);
    }

    /// True if another iteration may start after the current one
    pub fn iterations_remain(&self) -> bool {
        self.iteration + 1 < self.max_iterations
    }

    pub fn increment_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn total_duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}
