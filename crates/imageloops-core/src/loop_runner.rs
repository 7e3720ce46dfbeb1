use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use imageloops_agent::{ImageArtifact, ImageCritic, ImageProducer};
use imageloops_critic::{Critique, MeanAggregator, ScoreAggregator, ScoreRange};
use imageloops_logging::{AgentRole, LogEvent, Logger, SessionWriter};

use crate::context::IterationRecord;
use crate::error::LoopError;
use crate::outcome::LoopOutcome;
use crate::policy::{FailurePolicy, PromptStrategy, RefinePrompt};
use crate::state::PhaseEvent;
use crate::LoopContext;

/// Drives the generate -> critique -> evaluate cycle
pub struct LoopRunner<'a> {
    producer: &'a dyn ImageProducer,
    critic: &'a dyn ImageCritic,
    logger: Arc<Logger>,
    strategy: Box<dyn PromptStrategy>,
    aggregator: Box<dyn ScoreAggregator>,
    failure_policy: FailurePolicy,
    score_range: ScoreRange,
    session: Option<Arc<SessionWriter>>,
    output_dir: PathBuf,
}

impl<'a> LoopRunner<'a> {
    pub fn new(
        producer: &'a dyn ImageProducer,
        critic: &'a dyn ImageCritic,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            producer,
            critic,
            logger,
            strategy: Box::new(RefinePrompt),
            aggregator: Box::new(MeanAggregator),
            failure_policy: FailurePolicy::default(),
            score_range: ScoreRange::default(),
            session: None,
            output_dir: PathBuf::from("."),
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn PromptStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Box<dyn ScoreAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_score_range(mut self, range: ScoreRange) -> Self {
        self.score_range = range;
        self
    }

    /// Directory the producer writes into; reported at loop start
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Record every iteration of the run as JSONL
    pub fn with_session_writer(mut self, writer: Arc<SessionWriter>) -> Self {
        self.session = Some(writer);
        self
    }

    /// Refine `prompt` until the aggregate score exceeds `score_threshold`
    /// or `max_iterations` iterations have run.
    ///
    /// Only invalid parameters are returned as `Err`; producer and critic
    /// failures end the run with the matching [`LoopOutcome`] variant.
    pub async fn run(
        &self,
        prompt: &str,
        max_iterations: usize,
        score_threshold: f64,
    ) -> Result<LoopOutcome, LoopError> {
        let context = LoopContext::new(prompt, max_iterations, score_threshold, self.score_range)?;
        Ok(self.run_context(context).await)
    }

    /// Run the loop on prepared state
    pub async fn run_context(&self, mut context: LoopContext) -> LoopOutcome {
        self.logger.log(&LogEvent::LoopStarted {
            prompt: context.prompt().to_string(),
            output_dir: self.output_dir.clone(),
            max_iterations: context.max_iterations,
            threshold: context.threshold,
        });
        if let Some(ref session) = self.session {
            session.write_start(
                context.prompt().as_str(),
                &self.output_dir,
                self.producer.name(),
                self.critic.name(),
                context.max_iterations,
                context.threshold,
                self.strategy.name(),
                self.aggregator.name(),
            );
        }

        let outcome = loop {
            if let Some(outcome) = self.run_iteration(&mut context).await {
                break outcome;
            }
            context.increment_iteration();
        };

        if let Some(ref session) = self.session {
            session.write_end(
                outcome.reason().as_str(),
                outcome.iterations(),
                outcome.final_artifact().map(|a| a.path.as_path()),
                outcome.final_score(),
                outcome.error(),
                outcome.total_duration_secs(),
            );
        }

        outcome
    }

    /// Run a single iteration
    /// Returns Some(outcome) if the loop should terminate, None to continue
    async fn run_iteration(&self, context: &mut LoopContext) -> Option<LoopOutcome> {
        let iteration = context.iteration;
        let prompt = self
            .strategy
            .next_prompt(context.prompt(), context.latest_critique());

        // Generating
        self.logger.log(&LogEvent::GenerationStarted {
            iteration,
            prompt_preview: prompt.chars().take(100).collect(),
        });
        debug!(iteration, "Running producer");
        let started = Instant::now();
        let generated = self
            .with_retry(iteration, AgentRole::Producer, || self.producer.generate(&prompt))
            .await;

        let artifact = match generated {
            Ok(artifact) => artifact,
            Err(e) => {
                context.advance(PhaseEvent::GenerationFailed);
                let error = e.to_string();
                self.log_failure(iteration, AgentRole::Producer, &prompt, None, &error);
                return Some(LoopOutcome::generation_failure(
                    iteration + 1,
                    error,
                    context.latest_artifact().cloned(),
                    context.latest_critique().cloned(),
                    std::mem::take(&mut context.history),
                    context.total_duration(),
                ));
            }
        };
        context.advance(PhaseEvent::ArtifactProduced);
        context.set_artifact(artifact.clone());
        self.logger.log(&LogEvent::ArtifactSaved {
            iteration,
            path: artifact.path.clone(),
            duration_secs: started.elapsed().as_secs_f64(),
        });

        // Critiquing: always against the original prompt
        self.logger.log(&LogEvent::CritiqueStarted { iteration });
        debug!(iteration, "Running critic");
        let started = Instant::now();
        let original = context.prompt().as_str().to_string();
        let critiqued = self
            .with_retry(iteration, AgentRole::Critic, || {
                self.critic.critique(&artifact, &original)
            })
            .await;

        let critique = match critiqued {
            Ok(critique) => critique,
            Err(e) => {
                context.advance(PhaseEvent::CritiqueFailed);
                return Some(self.critique_failure(context, &prompt, artifact, e.to_string()));
            }
        };
        context.advance(PhaseEvent::CritiqueProduced);

        // Evaluating
        let Some(score) = self.aggregator.aggregate(&critique) else {
            context.advance(PhaseEvent::CritiqueFailed);
            let error = format!(
                "Critique has no scores for the {} aggregator",
                self.aggregator.name()
            );
            return Some(self.critique_failure(context, &prompt, artifact, error));
        };

        self.logger.log(&LogEvent::CritiqueCompleted {
            iteration,
            scores: critique.short_description(),
            aggregate: score,
            threshold: context.threshold,
            duration_secs: started.elapsed().as_secs_f64(),
        });

        let record = IterationRecord {
            iteration_number: iteration + 1,
            prompt: prompt.clone(),
            artifact: artifact.clone(),
            critique: Some(critique.clone()),
            aggregate_score: Some(score),
            timestamp: Utc::now(),
        };
        self.write_session_iteration(&record);
        context.push_record(record);
        context.set_critique(critique.clone(), Some(score));

        if score > context.threshold {
            context.advance(PhaseEvent::ScoreAboveThreshold);
            self.logger.log(&LogEvent::ThresholdMet {
                iterations: iteration + 1,
                score,
                duration_secs: context.total_duration().as_secs_f64(),
            });
            return Some(LoopOutcome::threshold_met(
                iteration + 1,
                artifact,
                critique,
                score,
                std::mem::take(&mut context.history),
                context.total_duration(),
            ));
        }

        let iterations_remain = context.iterations_remain();
        context.advance(PhaseEvent::ScoreBelowThreshold { iterations_remain });
        if !iterations_remain {
            self.logger.log(&LogEvent::MaxIterationsReached {
                iterations: iteration + 1,
                last_score: Some(score),
            });
            return Some(LoopOutcome::max_iterations_exhausted(
                iteration + 1,
                artifact,
                critique,
                score,
                std::mem::take(&mut context.history),
                context.total_duration(),
            ));
        }

        info!(
            iteration = iteration + 1,
            score,
            threshold = context.threshold,
            "Score below threshold, continuing"
        );
        None
    }

    /// Run `op`, retrying per the failure policy
    async fn with_retry<T, E, F, Fut>(
        &self,
        iteration: usize,
        role: AgentRole,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.failure_policy.max_retries => {
                    attempt += 1;
                    let delay = self.failure_policy.delay_for(attempt);
                    warn!(iteration, %role, attempt, error = %e, "Step failed, retrying");
                    self.logger.log(&LogEvent::RetryScheduled {
                        iteration,
                        role,
                        attempt,
                        delay_secs: delay.as_secs_f64(),
                        error: e.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn critique_failure(
        &self,
        context: &mut LoopContext,
        prompt: &str,
        artifact: ImageArtifact,
        error: String,
    ) -> LoopOutcome {
        let iteration = context.iteration;
        self.log_failure(
            iteration,
            AgentRole::Critic,
            prompt,
            Some(&artifact),
            &error,
        );
        context.push_record(IterationRecord {
            iteration_number: iteration + 1,
            prompt: prompt.to_string(),
            artifact: artifact.clone(),
            critique: None,
            aggregate_score: None,
            timestamp: Utc::now(),
        });

        // Critique of an earlier artifact, if any; the failing one has none
        let last_critique = context
            .history
            .iter()
            .rev()
            .find_map(|r| r.critique.clone());

        LoopOutcome::critique_failure(
            iteration + 1,
            error,
            artifact,
            last_critique,
            std::mem::take(&mut context.history),
            context.total_duration(),
        )
    }

    fn log_failure(
        &self,
        iteration: usize,
        role: AgentRole,
        prompt: &str,
        artifact: Option<&ImageArtifact>,
        error: &str,
    ) {
        warn!(iteration = iteration + 1, %role, error, "Run aborted");
        self.logger.log(&LogEvent::ErrorEncountered {
            iteration,
            role,
            error: error.to_string(),
        });
        if let Some(ref session) = self.session {
            session.write_iteration(
                iteration + 1,
                prompt,
                artifact.map(|a| a.path.as_path()),
                BTreeMap::new(),
                None,
                &[],
                Some(error),
                Utc::now(),
            );
        }
    }

    fn write_session_iteration(&self, record: &IterationRecord) {
        let Some(ref session) = self.session else {
            return;
        };
        let (scores, suggestions) = match record.critique {
            Some(ref critique) => (scores_map(critique), critique.suggestions.clone()),
            None => (BTreeMap::new(), Vec::new()),
        };
        session.write_iteration(
            record.iteration_number,
            &record.prompt,
            Some(record.artifact.path.as_path()),
            scores,
            record.aggregate_score,
            &suggestions,
            None,
            record.timestamp,
        );
    }
}

fn scores_map(critique: &Critique) -> BTreeMap<String, f64> {
    critique
        .dimensions
        .iter()
        .map(|d| (d.name.clone(), d.score))
        .collect()
}
