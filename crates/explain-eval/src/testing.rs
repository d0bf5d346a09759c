//! Deterministic models and explainers for tests and benchmarks.
//!
//! Everything here is cheap and reproducible: no randomness, no training.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array2, ArrayD, ArrayViewD, Axis, IxDyn};

use crate::error::Result;
use crate::functions::{Explainer, Perturbation};
use crate::model::{FnModel, Model, PredictOptions};

// =============================================================================
// Models
// =============================================================================

/// Two-class model: class 0 scores `threshold`, class 1 scores the input mean.
///
/// The predicted class flips from 1 to 0 once the mean drops below
/// `threshold`.
pub fn mean_threshold_model(threshold: f32) -> FnModel {
    FnModel::new("mean_threshold", move |x| {
        let n = x.len_of(Axis(0));
        let mut out = Array2::zeros((n, 2));
        for (i, inst) in x.axis_iter(Axis(0)).enumerate() {
            out[[i, 0]] = threshold;
            out[[i, 1]] = inst.mean().unwrap_or(0.0);
        }
        out
    })
}

/// Single-class model scoring the sum of each input.
pub fn sum_model() -> FnModel {
    FnModel::new("sum", |x| {
        let n = x.len_of(Axis(0));
        let mut out = Array2::zeros((n, 1));
        for (i, inst) in x.axis_iter(Axis(0)).enumerate() {
            out[[i, 0]] = inst.sum();
        }
        out
    })
}

/// Wraps a model and counts forward passes.
#[derive(Debug)]
pub struct CountingModel<M> {
    inner: M,
    calls: AtomicUsize,
}

impl<M: Model> CountingModel<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    /// Forward passes so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<M: Model> Model for CountingModel<M> {
    fn forward(&self, inputs: ArrayViewD<'_, f32>, options: &PredictOptions) -> Result<Array2<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.forward(inputs, options)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// =============================================================================
// Explainers
// =============================================================================

/// Attributions equal to `value` everywhere, single channel.
pub fn constant_explainer(value: f32) -> Explainer {
    Explainer::new("constant", move |_model, x, _y| {
        let mut shape = x.shape().to_vec();
        if shape.len() > 1 {
            shape[1] = 1;
        }
        Ok(ArrayD::from_elem(IxDyn(&shape), value))
    })
}

/// Attributions equal to the input.
pub fn input_explainer() -> Explainer {
    Explainer::new("input", |_model, x, _y| Ok(x.to_owned()))
}

/// An explainer that counts its invocations in `counter`.
pub fn counting_explainer(inner: Explainer, counter: Arc<AtomicUsize>) -> Explainer {
    Explainer::new("counting", move |model, x, y| {
        counter.fetch_add(1, Ordering::SeqCst);
        inner.explain(model, x, y)
    })
}

// =============================================================================
// Perturbations
// =============================================================================

/// Multiply the input by `1 - scale * perturb_dx / dx_max`.
///
/// With `scale = 1` the input fades linearly to zero over the sweep; with
/// `scale = 2` it crosses zero halfway.
pub fn fade_perturbation(scale: f32) -> Perturbation {
    Perturbation::new("fade", move |arr, args| {
        let t = if args.dx_max == 0 {
            0.0
        } else {
            args.perturb_dx as f32 / args.dx_max as f32
        };
        let factor = 1.0 - scale * t;
        arr.mapv(|v| v * factor)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::PerturbArgs;
    use crate::model::{ModelAdapter, Predictor};

    #[test]
    fn counting_model_counts() {
        let model = CountingModel::new(sum_model());
        let adapter = ModelAdapter::new(&model, true, false, None, PredictOptions::default());
        let x = ArrayD::<f32>::ones(IxDyn(&[2, 1, 2, 2]));
        let scores = adapter.predict(x.view()).unwrap();
        assert_eq!(scores[[1, 0]], 4.0);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn mean_threshold_flips() {
        let model = mean_threshold_model(0.1);
        let adapter = ModelAdapter::new(&model, true, false, None, PredictOptions::default());
        let pos = ArrayD::<f32>::ones(IxDyn(&[1, 1, 2, 2]));
        let neg = pos.mapv(|v| -v);
        assert_eq!(crate::utils::argmax(adapter.predict(pos.view()).unwrap().row(0)), Some(1));
        assert_eq!(crate::utils::argmax(adapter.predict(neg.view()).unwrap().row(0)), Some(0));
    }

    #[test]
    fn fade_reaches_zero() {
        let x = ArrayD::<f32>::ones(IxDyn(&[1, 2]));
        let args = PerturbArgs {
            indices: &[],
            indexed_axes: &[],
            perturb_dx: 4,
            dx_max: 4,
        };
        let out = fade_perturbation(1.0).perturb(x.view(), &args);
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
