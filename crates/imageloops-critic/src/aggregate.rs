use std::collections::HashMap;

use crate::Critique;

/// Collapses a critique's dimension scores into one number.
///
/// Returns `None` when there is nothing to aggregate.
pub trait ScoreAggregator: Send + Sync {
    fn name(&self) -> &str;

    fn aggregate(&self, critique: &Critique) -> Option<f64>;
}

/// Arithmetic mean of all dimensions
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAggregator;

impl ScoreAggregator for MeanAggregator {
    fn name(&self) -> &str {
        "mean"
    }

    fn aggregate(&self, critique: &Critique) -> Option<f64> {
        if critique.dimensions.is_empty() {
            return None;
        }
        let sum: f64 = critique.dimensions.iter().map(|d| d.score).sum();
        Some(sum / critique.dimensions.len() as f64)
    }
}

/// Lowest dimension score, so every dimension has to clear the threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct MinAggregator;

impl ScoreAggregator for MinAggregator {
    fn name(&self) -> &str {
        "min"
    }

    fn aggregate(&self, critique: &Critique) -> Option<f64> {
        critique
            .dimensions
            .iter()
            .map(|d| d.score)
            .min_by(|a, b| a.total_cmp(b))
    }
}

/// Weighted mean; dimensions without an explicit weight get `default_weight`
#[derive(Debug, Clone)]
pub struct WeightedAggregator {
    weights: HashMap<String, f64>,
    default_weight: f64,
}

impl WeightedAggregator {
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self {
            weights: weights
                .into_iter()
                .map(|(name, w)| (name.to_lowercase(), w))
                .collect(),
            default_weight: 1.0,
        }
    }

    pub fn with_default_weight(mut self, weight: f64) -> Self {
        self.default_weight = weight;
        self
    }

    fn weight_of(&self, name: &str) -> f64 {
        self.weights
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl ScoreAggregator for WeightedAggregator {
    fn name(&self) -> &str {
        "weighted"
    }

    fn aggregate(&self, critique: &Critique) -> Option<f64> {
        let (sum, total_weight) = critique
            .dimensions
            .iter()
            .map(|d| (d.score, self.weight_of(&d.name).max(0.0)))
            .fold((0.0, 0.0), |(sum, total), (score, w)| {
                (sum + score * w, total + w)
            });

        if total_weight > 0.0 {
            Some(sum / total_weight)
        } else {
            None
        }
    }
}

/// Built-in aggregation choices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregation {
    #[default]
    Mean,
    Min,
    Weighted,
}

impl Aggregation {
    /// Build the aggregator; `weights` is only used by [`Aggregation::Weighted`].
    pub fn build(self, weights: HashMap<String, f64>) -> Box<dyn ScoreAggregator> {
        match self {
            Aggregation::Mean => Box::new(MeanAggregator),
            Aggregation::Min => Box::new(MinAggregator),
            Aggregation::Weighted => Box::new(WeightedAggregator::new(weights)),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Mean => write!(f, "mean"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Weighted => write!(f, "weighted"),
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" | "average" | "avg" => Ok(Aggregation::Mean),
            "min" | "minimum" => Ok(Aggregation::Min),
            "weighted" => Ok(Aggregation::Weighted),
            _ => Err(format!("Unknown aggregation: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn critique() -> Critique {
        Critique::from_scores([
            ("content", 8.0),
            ("clarity", 7.0),
            ("proportion", 6.0),
            ("color", 9.0),
        ])
    }

    #[test]
    fn test_mean() {
        assert_eq!(MeanAggregator.aggregate(&critique()), Some(7.5));
    }

    #[test]
    fn test_min() {
        assert_eq!(MinAggregator.aggregate(&critique()), Some(6.0));
    }

    #[test]
    fn test_empty_critique_has_no_aggregate() {
        let empty = Critique::new(Vec::new(), Vec::new());
        assert_eq!(MeanAggregator.aggregate(&empty), None);
        assert_eq!(MinAggregator.aggregate(&empty), None);
        assert_eq!(WeightedAggregator::new(HashMap::new()).aggregate(&empty), None);
    }

    #[test]
    fn test_weighted() {
        let weights = HashMap::from([("Content".to_string(), 3.0), ("color".to_string(), 0.0)]);
        let aggregator = WeightedAggregator::new(weights);
        // (8*3 + 7 + 6) / 5
        let score = aggregator.aggregate(&critique()).unwrap();
        assert!((score - 7.4).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_without_weights_is_mean() {
        let aggregator = WeightedAggregator::new(HashMap::new());
        assert_eq!(aggregator.aggregate(&critique()), Some(7.5));
    }

    #[test]
    fn test_aggregation_from_str() {
        assert_eq!("MEAN".parse::<Aggregation>(), Ok(Aggregation::Mean));
        assert_eq!("minimum".parse::<Aggregation>(), Ok(Aggregation::Min));
        assert!("median".parse::<Aggregation>().is_err());
    }
}
