//! Aggregation of per-instance scores.

use std::sync::Arc;

pub type AggregateFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync + 'static>;

/// Collapses per-instance scores into one value.
#[derive(Clone)]
pub struct Aggregator {
    name: &'static str,
    aggregate_fn: AggregateFn,
}

impl Aggregator {
    pub fn new(
        name: &'static str,
        aggregate_fn: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            aggregate_fn: Arc::new(aggregate_fn),
        }
    }

    /// Arithmetic mean. NaN propagates; empty input gives NaN.
    pub fn mean() -> Self {
        Self::new("mean", |scores| {
            if scores.is_empty() {
                return f64::NAN;
            }
            scores.iter().sum::<f64>() / scores.len() as f64
        })
    }

    pub fn aggregate(&self, scores: &[f64]) -> f64 {
        (self.aggregate_fn)(scores)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::mean()
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_propagates_nan() {
        let mean = Aggregator::mean();
        assert_eq!(mean.aggregate(&[1.0, 2.0, 3.0]), 2.0);
        assert!(mean.aggregate(&[1.0, f64::NAN]).is_nan());
        assert!(mean.aggregate(&[]).is_nan());
    }
}
