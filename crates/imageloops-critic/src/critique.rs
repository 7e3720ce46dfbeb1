use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range every dimension score must fall in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::new(1.0, 10.0)
    }
}

impl fmt::Display for ScoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// A single named score, e.g. `clarity: 7`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub name: String,
    pub score: f64,
}

impl DimensionScore {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Evaluation of one artifact against its prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    /// Per-dimension scores in the order the critic reported them
    pub dimensions: Vec<DimensionScore>,
    /// Concrete actions to improve the image
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Raw critic text
    #[serde(default)]
    pub raw: String,
    /// False when the scores came from the configured fallback
    #[serde(default = "default_parsed")]
    pub parsed: bool,
}

fn default_parsed() -> bool {
    true
}

impl Critique {
    pub fn new(dimensions: Vec<DimensionScore>, suggestions: Vec<String>) -> Self {
        Self {
            dimensions,
            suggestions,
            raw: String::new(),
            parsed: true,
        }
    }

    /// Critique with one score per `(name, score)` pair and no suggestions
    pub fn from_scores<'a>(scores: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self::new(
            scores
                .into_iter()
                .map(|(name, score)| DimensionScore::new(name, score))
                .collect(),
            Vec::new(),
        )
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.dimensions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.score)
    }

    /// Short description of the scores for logging
    pub fn short_description(&self) -> String {
        self.dimensions
            .iter()
            .map(|d| format!("{}={}", d.name, d.score))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains() {
        let range = ScoreRange::default();
        assert!(range.contains(1.0));
        assert!(range.contains(10.0));
        assert!(!range.contains(0.0));
        assert!(!range.contains(10.5));
        assert!(!range.contains(f64::NAN));
    }

    #[test]
    fn test_score_lookup_is_case_insensitive() {
        let critique = Critique::from_scores([("Content", 8.0), ("clarity", 6.0)]);
        assert_eq!(critique.score("content"), Some(8.0));
        assert_eq!(critique.score("CLARITY"), Some(6.0));
        assert_eq!(critique.score("color"), None);
    }

    #[test]
    fn test_short_description() {
        let critique = Critique::from_scores([("content", 8.0), ("color", 6.5)]);
        assert_eq!(critique.short_description(), "content=8 color=6.5");
    }
}
