//! Critique model for imageloops: scores, parsing, aggregation and prompts.

mod aggregate;
mod critique;
mod parser;
mod prompts;

pub use aggregate::{
    Aggregation, MeanAggregator, MinAggregator, ScoreAggregator, WeightedAggregator,
};
pub use critique::{Critique, DimensionScore, ScoreRange};
pub use parser::{CritiqueParseError, CritiqueParser, OVERALL_DIMENSION};
pub use prompts::CriticPrompts;
