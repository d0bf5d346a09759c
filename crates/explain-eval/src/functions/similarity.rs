//! Similarity between two score traces.

use std::sync::Arc;

pub type SimilarityFn = Arc<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static>;

/// Compares two equally long traces and returns a scalar.
#[derive(Clone)]
pub struct Similarity {
    name: &'static str,
    similarity_fn: SimilarityFn,
}

impl Similarity {
    pub fn new(
        name: &'static str,
        similarity_fn: impl Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            similarity_fn: Arc::new(similarity_fn),
        }
    }

    /// Pearson correlation coefficient.
    ///
    /// NaN when either trace has zero variance or the lengths differ.
    pub fn pearson() -> Self {
        Self::new("correlation_pearson", pearson)
    }

    /// Mean absolute difference.
    pub fn difference() -> Self {
        Self::new("difference", |a, b| {
            if a.len() != b.len() || a.is_empty() {
                return f64::NAN;
            }
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
        })
    }

    pub fn compute(&self, a: &[f64], b: &[f64]) -> f64 {
        (self.similarity_fn)(a, b)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Similarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Similarity").field("name", &self.name).finish()
    }
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() < 2 {
        return f64::NAN;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - mean_a, y - mean_b);
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}
