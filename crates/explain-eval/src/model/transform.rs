//! Output transformation applied to model scores.
//!
//! - [`Identity`](OutputTransform::Identity): raw logits
//! - [`Softmax`](OutputTransform::Softmax): class probabilities

use ndarray::Array2;

/// How raw class scores are turned into predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputTransform {
    /// No transformation; output = logits.
    #[default]
    Identity,

    /// Softmax over the class axis of each row.
    Softmax,
}

impl OutputTransform {
    /// Transform selected by a softmax flag.
    pub fn from_softmax(softmax: bool) -> Self {
        if softmax {
            Self::Softmax
        } else {
            Self::Identity
        }
    }

    /// Apply the transformation in-place to a `(n_rows, n_classes)` score matrix.
    ///
    /// NaN and Inf inputs propagate through without panics.
    pub fn transform_inplace(&self, scores: &mut Array2<f32>) {
        match self {
            OutputTransform::Identity => {}
            OutputTransform::Softmax => {
                // Rows are not contiguous when the backend returns a transposed matrix.
                for mut row in scores.rows_mut() {
                    let mut buf = row.to_vec();
                    softmax_inplace(&mut buf);
                    row.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
                }
            }
        }
    }
}

/// Numerically stable softmax in-place.
/// Subtracts max before exponentiating to avoid overflow.
#[inline]
fn softmax_inplace(row: &mut [f32]) {
    if row.is_empty() {
        return;
    }

    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}
