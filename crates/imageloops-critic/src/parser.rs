use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::{Critique, DimensionScore, ScoreRange};

/// Name given to a single rating that is not tied to a dimension
pub const OVERALL_DIMENSION: &str = "overall";

/// Longest free-text suggestion kept when the critic gave no list
const MAX_REMAINDER_LEN: usize = 500;

#[derive(Error, Debug, PartialEq)]
pub enum CritiqueParseError {
    #[error("Critic output is empty")]
    EmptyOutput,

    #[error("No score in range {0} found in critic output")]
    NoScores(ScoreRange),
}

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("Invalid regex pattern"))
}

fn pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""?([A-Za-z][A-Za-z0-9_ ]*?)"?\s*[:=]\s*(\d+(?:\.\d+)?)"#)
            .expect("Invalid regex pattern")
    })
}

fn score_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:[-*•]|\d+[.)])?\s*\**\s*([A-Za-z][A-Za-z0-9_ ()]*?)\s*\**\s*[:=]\s*\**\s*(\d+(?:\.\d+)?)\s*\**\s*(?:/\s*10|out of 10)?\s*\.?\s*$",
        )
        .expect("Invalid regex pattern")
    })
}

fn overall_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:/|out of)\s*10\b").expect("Invalid regex pattern")
    })
}

fn list_item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("Invalid regex pattern")
    })
}

/// Turns free-text critic output into a [`Critique`].
///
/// Scores are looked for in this order, first hit wins:
/// 1. a `{name: n, ...}` block
/// 2. lines of the form `name: n` (optionally bulleted, `n/10` allowed)
/// 3. a single `n/10` or `n out of 10` rating, recorded as `overall`
///
/// Scores outside the range are ignored. When nothing usable is found the
/// parser fails, unless a fallback score is configured.
#[derive(Debug, Clone, Default)]
pub struct CritiqueParser {
    range: ScoreRange,
    fallback_score: Option<f64>,
}

impl CritiqueParser {
    pub fn new(range: ScoreRange) -> Self {
        Self {
            range,
            fallback_score: None,
        }
    }

    /// Score to use instead of failing when the output has no usable score.
    pub fn with_fallback_score(mut self, score: f64) -> Self {
        self.fallback_score = Some(score);
        self
    }

    pub fn range(&self) -> ScoreRange {
        self.range
    }

    pub fn fallback_score(&self) -> Option<f64> {
        self.fallback_score
    }

    pub fn parse(&self, output: &str) -> Result<Critique, CritiqueParseError> {
        debug!(output_len = output.len(), "Parsing critique");

        if output.trim().is_empty() {
            return Err(CritiqueParseError::EmptyOutput);
        }

        let mut dimensions = self.parse_block(output);
        if dimensions.is_empty() {
            dimensions = self.parse_score_lines(output);
        }
        if dimensions.is_empty() {
            dimensions = self.parse_overall(output);
        }

        let parsed = !dimensions.is_empty();
        if !parsed {
            match self.fallback_score {
                Some(score) => {
                    debug!(score, "No score found, using fallback");
                    dimensions.push(DimensionScore::new(OVERALL_DIMENSION, score));
                }
                None => return Err(CritiqueParseError::NoScores(self.range)),
            }
        }

        Ok(Critique {
            dimensions,
            suggestions: extract_suggestions(output),
            raw: output.to_string(),
            parsed,
        })
    }

    fn parse_block(&self, output: &str) -> Vec<DimensionScore> {
        for block in block_regex().captures_iter(output) {
            let mut dimensions = Vec::new();
            for pair in pair_regex().captures_iter(&block[1]) {
                self.push_score(&mut dimensions, &pair[1], &pair[2]);
            }
            if !dimensions.is_empty() {
                debug!(count = dimensions.len(), "Found score block");
                return dimensions;
            }
        }
        Vec::new()
    }

    fn parse_score_lines(&self, output: &str) -> Vec<DimensionScore> {
        let mut dimensions = Vec::new();
        for line in score_line_regex().captures_iter(output) {
            self.push_score(&mut dimensions, &line[1], &line[2]);
        }
        dimensions
    }

    fn parse_overall(&self, output: &str) -> Vec<DimensionScore> {
        overall_regex()
            .captures_iter(output)
            .filter_map(|c| c[1].parse::<f64>().ok())
            .find(|score| self.range.contains(*score))
            .map(|score| vec![DimensionScore::new(OVERALL_DIMENSION, score)])
            .unwrap_or_default()
    }

    fn push_score(&self, dimensions: &mut Vec<DimensionScore>, raw_name: &str, raw_score: &str) {
        let Ok(score) = raw_score.parse::<f64>() else {
            return;
        };
        if !self.range.contains(score) {
            debug!(name = raw_name, score, "Ignoring out-of-range score");
            return;
        }
        let name = normalize_name(raw_name);
        if name.is_empty() || dimensions.iter().any(|d| d.name == name) {
            return;
        }
        dimensions.push(DimensionScore::new(name, score));
    }
}

/// `"Content similarity (content)"` -> `content`, `"Color and typography"` -> `color_and_typography`
fn normalize_name(raw: &str) -> String {
    let raw = raw.trim().trim_matches('*');
    let inner = match (raw.rfind('('), raw.rfind(')')) {
        (Some(open), Some(close)) if open < close => &raw[open + 1..close],
        _ => raw,
    };
    inner
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn extract_suggestions(output: &str) -> Vec<String> {
    let score_lines = score_line_regex();
    let items: Vec<String> = list_item_regex()
        .captures_iter(output)
        .filter(|c| !score_lines.is_match(&c[0]))
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if !items.is_empty() {
        return items;
    }

    // No list: keep whatever prose is left once the scores are removed
    let without_blocks = block_regex().replace_all(output, "");
    let remainder = score_lines.replace_all(&without_blocks, "");
    let remainder = remainder.split_whitespace().collect::<Vec<_>>().join(" ");
    if remainder.is_empty() {
        return Vec::new();
    }

    let truncated = if remainder.len() > MAX_REMAINDER_LEN {
        let mut end = MAX_REMAINDER_LEN;
        while !remainder.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &remainder[..end])
    } else {
        remainder
    };
    vec![truncated]
}
