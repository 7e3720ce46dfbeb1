//! Refinement loop for prompt-driven image generation.
//!
//! A [`LoopRunner`] alternates an image producer and an image critic until
//! the aggregate critique score exceeds a threshold or the iteration bound
//! is reached. Every run ends in a [`LoopOutcome`].

mod context;
mod error;
mod loop_runner;
mod outcome;
mod policy;
mod state;

pub use context::{IterationRecord, LoopContext};
pub use error::LoopError;
pub use loop_runner::LoopRunner;
pub use outcome::{LoopOutcome, TerminationReason};
pub use policy::{FailurePolicy, FixedPrompt, PromptStrategy, RefinePrompt, Strategy};
pub use state::{LoopPhase, PhaseEvent};
