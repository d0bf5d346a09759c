//! Perturbation functions.
//!
//! A perturbation takes one channel-first instance and returns an array of
//! the same shape. The engine checks the shape after every call.

use std::sync::Arc;

use ndarray::{ArrayD, ArrayViewD, Axis, Slice};
use serde::{Deserialize, Serialize};

/// Arguments handed to a perturbation on every call.
#[derive(Debug, Clone, Copy)]
pub struct PerturbArgs<'a> {
    /// Flat (row-major) element indices selected for perturbation.
    pub indices: &'a [usize],
    /// Axes the indices refer to.
    pub indexed_axes: &'a [usize],
    /// Perturbation magnitude for this step.
    pub perturb_dx: usize,
    /// Magnitude reached at the final step.
    pub dx_max: usize,
}

/// Value used to fill regions a perturbation uncovers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    /// Minimum of the instance.
    #[default]
    Black,
    /// Maximum of the instance.
    White,
    /// Mean of the instance.
    Mean,
    /// A fixed value.
    Value(f32),
}

impl Baseline {
    /// Resolve the fill value for `arr`.
    pub fn value(&self, arr: &ArrayViewD<'_, f32>) -> f32 {
        match self {
            Self::Black => arr.iter().cloned().fold(f32::INFINITY, f32::min),
            Self::White => arr.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
            Self::Mean => arr.mean().unwrap_or(0.0),
            Self::Value(v) => *v,
        }
        .clamp(f32::MIN, f32::MAX)
    }
}

pub type PerturbFn =
    Arc<dyn Fn(ArrayViewD<'_, f32>, &PerturbArgs<'_>) -> ArrayD<f32> + Send + Sync + 'static>;

/// A perturbation function with a name for logging.
#[derive(Clone)]
pub struct Perturbation {
    name: &'static str,
    perturb_fn: PerturbFn,
}

impl Perturbation {
    pub fn new(
        name: &'static str,
        perturb_fn: impl Fn(ArrayViewD<'_, f32>, &PerturbArgs<'_>) -> ArrayD<f32>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            perturb_fn: Arc::new(perturb_fn),
        }
    }

    /// Returns the input unchanged.
    pub fn identity() -> Self {
        Self::new("identity", |arr, _| arr.to_owned())
    }

    /// Shift the instance `perturb_dx` positions along its last axis.
    ///
    /// Uncovered positions are filled with `baseline`, resolved on the
    /// unperturbed instance.
    pub fn translation_x_direction(baseline: Baseline) -> Self {
        Self::new("translation_x_direction", move |arr, args| {
            translate_last_axis(&arr, args.perturb_dx, baseline.value(&arr))
        })
    }

    /// Replace the elements at `indices` with `baseline`.
    pub fn baseline_replacement_by_indices(baseline: Baseline) -> Self {
        Self::new("baseline_replacement_by_indices", move |arr, args| {
            let fill = baseline.value(&arr);
            let mut out = arr.as_standard_layout().into_owned();
            if let Some(flat) = out.as_slice_mut() {
                for &i in args.indices {
                    if let Some(v) = flat.get_mut(i) {
                        *v = fill;
                    }
                }
            }
            out
        })
    }

    pub fn perturb(&self, arr: ArrayViewD<'_, f32>, args: &PerturbArgs<'_>) -> ArrayD<f32> {
        (self.perturb_fn)(arr, args)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Perturbation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Perturbation").field("name", &self.name).finish()
    }
}

fn translate_last_axis(arr: &ArrayViewD<'_, f32>, dx: usize, fill: f32) -> ArrayD<f32> {
    let mut out = ArrayD::from_elem(arr.raw_dim(), fill);
    let Some(last) = arr.ndim().checked_sub(1) else {
        return arr.to_owned();
    };
    let width = arr.len_of(Axis(last));
    if dx >= width {
        return out;
    }
    let src = arr.slice_axis(Axis(last), Slice::from(0..width - dx));
    out.slice_axis_mut(Axis(last), Slice::from(dx..width)).assign(&src);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    fn args(dx: usize) -> PerturbArgs<'static> {
        PerturbArgs {
            indices: &[],
            indexed_axes: &[],
            perturb_dx: dx,
            dx_max: 4,
        }
    }

    #[test]
    fn translation_shifts_right_and_fills() {
        let x = array![[[1.0f32, 2.0, 3.0, 4.0]]].into_dyn();
        let p = Perturbation::translation_x_direction(Baseline::Black);
        let out = p.perturb(x.view(), &args(1));
        assert_eq!(out, array![[[1.0f32, 1.0, 2.0, 3.0]]].into_dyn());

        let out = Perturbation::translation_x_direction(Baseline::Value(-1.0)).perturb(x.view(), &args(2));
        assert_eq!(out, array![[[-1.0f32, -1.0, 1.0, 2.0]]].into_dyn());
    }

    #[test]
    fn translation_past_width_is_all_baseline() {
        let x = ArrayD::from_shape_fn(IxDyn(&[1, 2, 3]), |ix| ix[2] as f32);
        let out = Perturbation::translation_x_direction(Baseline::White).perturb(x.view(), &args(3));
        assert!(out.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn replacement_by_indices() {
        let x = array![[0.5f32, 0.5], [0.5, 1.0]].into_dyn();
        let p = Perturbation::baseline_replacement_by_indices(Baseline::Value(0.0));
        let out = p.perturb(
            x.view(),
            &PerturbArgs {
                indices: &[0, 3],
                indexed_axes: &[0, 1],
                perturb_dx: 0,
                dx_max: 0,
            },
        );
        assert_eq!(out, array![[0.0f32, 0.5], [0.5, 0.0]].into_dyn());
    }

    #[test]
    fn baseline_values() {
        let x = array![1.0f32, 3.0].into_dyn();
        assert_eq!(Baseline::Black.value(&x.view()), 1.0);
        assert_eq!(Baseline::White.value(&x.view()), 3.0);
        assert_eq!(Baseline::Mean.value(&x.view()), 2.0);
    }
}
