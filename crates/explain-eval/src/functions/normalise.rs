//! Attribution normalisation.

use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD};

pub type NormaliseFn = Arc<dyn Fn(ArrayViewD<'_, f32>) -> ArrayD<f32> + Send + Sync + 'static>;

/// Normalises one instance's attribution.
#[derive(Clone)]
pub struct Normaliser {
    name: &'static str,
    normalise_fn: NormaliseFn,
}

impl Normaliser {
    pub fn new(
        name: &'static str,
        normalise_fn: impl Fn(ArrayViewD<'_, f32>) -> ArrayD<f32> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            normalise_fn: Arc::new(normalise_fn),
        }
    }

    /// Divide by the largest absolute value. All-zero input is returned as is.
    pub fn by_max() -> Self {
        Self::new("normalise_by_max", |a| {
            let max_abs = a.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            if max_abs > 0.0 {
                a.mapv(|v| v / max_abs)
            } else {
                a.to_owned()
            }
        })
    }

    /// Scale positives by the maximum and negatives by the magnitude of the
    /// minimum, so the result lies in `[-1, 1]` with signs preserved.
    pub fn by_negative() -> Self {
        Self::new("normalise_by_negative", |a| {
            let min = a.iter().cloned().fold(f32::INFINITY, f32::min);
            let max = a.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            if a.is_empty() {
                return a.to_owned();
            }
            if min >= 0.0 {
                if max > 0.0 {
                    a.mapv(|v| v / max)
                } else {
                    a.to_owned()
                }
            } else if max <= 0.0 {
                a.mapv(|v| -v / min)
            } else {
                a.mapv(|v| {
                    if v > 0.0 {
                        v / max
                    } else if v < 0.0 {
                        -v / min
                    } else {
                        0.0
                    }
                })
            }
        })
    }

    pub fn normalise(&self, a: ArrayViewD<'_, f32>) -> ArrayD<f32> {
        (self.normalise_fn)(a)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Normaliser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normaliser").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn by_max_uses_absolute_peak() {
        let a = array![-4.0f32, 2.0, 1.0].into_dyn();
        let out = Normaliser::by_max().normalise(a.view());
        assert_eq!(out, array![-1.0f32, 0.5, 0.25].into_dyn());
    }

    #[test]
    fn by_max_keeps_zeros() {
        let a = array![0.0f32, 0.0].into_dyn();
        assert_eq!(Normaliser::by_max().normalise(a.view()), a);
    }

    #[test]
    fn by_negative_scales_each_sign() {
        let a = array![-2.0f32, 0.0, 4.0, 1.0].into_dyn();
        let out = Normaliser::by_negative().normalise(a.view());
        assert_abs_diff_eq!(out[0], -1.0);
        assert_abs_diff_eq!(out[1], 0.0);
        assert_abs_diff_eq!(out[2], 1.0);
        assert_abs_diff_eq!(out[3], 0.25);

        let neg = array![-2.0f32, -1.0].into_dyn();
        let out = Normaliser::by_negative().normalise(neg.view());
        assert_eq!(out, array![-1.0f32, -0.5].into_dyn());
    }
}
