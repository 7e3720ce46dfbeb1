use std::time::Duration;

use imageloops_agent::Prompt;
use imageloops_critic::{CriticPrompts, Critique};

/// Decides which prompt the producer gets on each iteration
pub trait PromptStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `previous` is the critique of the prior iteration, `None` on the first.
    fn next_prompt(&self, original: &Prompt, previous: Option<&Critique>) -> String;
}

/// Always regenerate from the original prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPrompt;

impl PromptStrategy for FixedPrompt {
    fn name(&self) -> &str {
        "fixed"
    }

    fn next_prompt(&self, original: &Prompt, _previous: Option<&Critique>) -> String {
        original.as_str().to_string()
    }
}

/// Fold the previous critique's suggestions into the original prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct RefinePrompt;

impl PromptStrategy for RefinePrompt {
    fn name(&self) -> &str {
        "refine"
    }

    fn next_prompt(&self, original: &Prompt, previous: Option<&Critique>) -> String {
        match previous {
            Some(critique) => CriticPrompts::build_refinement_prompt(original.as_str(), critique),
            None => original.as_str().to_string(),
        }
    }
}

/// Built-in prompt strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    Fixed,
    #[default]
    Refine,
}

impl Strategy {
    pub fn build(self) -> Box<dyn PromptStrategy> {
        match self {
            Strategy::Fixed => Box::new(FixedPrompt),
            Strategy::Refine => Box::new(RefinePrompt),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Fixed => write!(f, "fixed"),
            Strategy::Refine => write!(f, "refine"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" | "original" => Ok(Strategy::Fixed),
            "refine" | "feedback" => Ok(Strategy::Refine),
            _ => Err(format!("Unknown prompt strategy: {}", s)),
        }
    }
}

/// What to do when the producer or critic fails.
///
/// The default aborts on the first failure. With `max_retries > 0` the same
/// step is retried after an exponentially growing delay
/// (`initial_backoff * multiplier^(attempt - 1)`, capped at `max_backoff`).
#[derive(Debug, Clone, PartialEq)]
pub struct FailurePolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl FailurePolicy {
    /// Abort the run on the first failure
    pub fn abort() -> Self {
        Self::default()
    }

    /// Retry each failing step up to `max_retries` times
    pub fn retry(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let nanos = self.initial_backoff.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_backoff.as_nanos() as f64 {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}
