//! Channel-order handling for batched inputs.
//!
//! Internally every batch is channel-first: axis 0 is the instance axis,
//! axis 1 the channel axis, and the remaining axes are spatial.

use ndarray::{ArrayD, ArrayViewD};

use crate::error::ShapeError;

/// Semantic axis constants for batched, channel-first arrays.
pub mod axis {
    use ndarray::Axis;

    /// Instance axis of a batch.
    pub const BATCH: Axis = Axis(0);
    /// Channel axis of a batch.
    pub const CHANNEL: Axis = Axis(1);
    /// First spatial axis of a single instance (batch axis stripped).
    pub const FIRST_SPATIAL: usize = 1;
}

/// Infer whether a batch shape is channel-first.
///
/// The channel axis is taken to be the smaller of axis 1 and the last axis.
/// For rank-3 batches the two are compared directly; for higher ranks the
/// candidate must be strictly smaller than every other non-batch axis.
///
/// # Errors
///
/// [`ShapeError::UnsupportedRank`] below rank 3, [`ShapeError::AmbiguousLayout`]
/// when neither candidate is strictly smallest.
pub fn infer_channel_first(shape: &[usize]) -> Result<bool, ShapeError> {
    let ndim = shape.len();
    if ndim < 3 {
        return Err(ShapeError::UnsupportedRank(ndim));
    }

    let first = shape[axis::CHANNEL.index()];
    let last = shape[ndim - 1];

    if ndim == 3 {
        return match first.cmp(&last) {
            std::cmp::Ordering::Less => Ok(true),
            std::cmp::Ordering::Greater => Ok(false),
            std::cmp::Ordering::Equal => Err(ShapeError::AmbiguousLayout(shape.to_vec())),
        };
    }

    if shape[1..ndim - 1].iter().all(|&s| last < s) {
        return Ok(false);
    }
    if shape[2..].iter().all(|&s| first < s) {
        return Ok(true);
    }
    Err(ShapeError::AmbiguousLayout(shape.to_vec()))
}

/// Axis permutation moving the last axis to position 1.
fn last_to_channel(ndim: usize) -> Vec<usize> {
    let mut perm = Vec::with_capacity(ndim);
    perm.push(0);
    perm.push(ndim - 1);
    perm.extend(1..ndim - 1);
    perm
}

/// Axis permutation moving axis 1 to the end.
fn channel_to_last(ndim: usize) -> Vec<usize> {
    let mut perm = Vec::with_capacity(ndim);
    perm.push(0);
    perm.extend(2..ndim);
    perm.push(1);
    perm
}

/// Reorder a batch to channel-first layout.
///
/// Returns the batch unchanged when it already is channel-first.
pub fn make_channel_first(x: ArrayD<f32>, channel_first: bool) -> Result<ArrayD<f32>, ShapeError> {
    if channel_first {
        return Ok(x);
    }
    let ndim = x.ndim();
    if ndim < 3 {
        return Err(ShapeError::UnsupportedRank(ndim));
    }
    Ok(x
        .permuted_axes(last_to_channel(ndim))
        .as_standard_layout()
        .into_owned())
}

/// Reorder a channel-first batch to channel-last layout.
pub fn make_channel_last(x: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, ShapeError> {
    let ndim = x.ndim();
    if ndim < 3 {
        return Err(ShapeError::UnsupportedRank(ndim));
    }
    Ok(x.permuted_axes(channel_to_last(ndim))
        .as_standard_layout()
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn infers_image_layouts() {
        assert_eq!(infer_channel_first(&[8, 3, 28, 28]), Ok(true));
        assert_eq!(infer_channel_first(&[8, 28, 28, 3]), Ok(false));
        assert_eq!(infer_channel_first(&[8, 1, 28, 28]), Ok(true));
    }

    #[test]
    fn infers_rank3_layouts() {
        assert_eq!(infer_channel_first(&[4, 3, 100]), Ok(true));
        assert_eq!(infer_channel_first(&[4, 100, 3]), Ok(false));
        assert!(matches!(
            infer_channel_first(&[4, 5, 5]),
            Err(ShapeError::AmbiguousLayout(_))
        ));
    }

    #[test]
    fn rejects_ambiguous_and_low_rank() {
        assert!(matches!(
            infer_channel_first(&[2, 4, 4, 4]),
            Err(ShapeError::AmbiguousLayout(_))
        ));
        assert_eq!(infer_channel_first(&[2, 4]), Err(ShapeError::UnsupportedRank(2)));
    }

    #[test]
    fn channel_last_round_trip_moves_values() {
        // (1, H=2, W=2, C=2)
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 2, 2, 2]), data).unwrap();

        let first = make_channel_first(x.clone(), false).unwrap();
        assert_eq!(first.shape(), &[1, 2, 2, 2]);
        // channel 1 at (h=0, w=1) was x[0, 0, 1, 1] = 3
        assert_eq!(first[[0, 1, 0, 1]], 3.0);

        let back = make_channel_last(first.view()).unwrap();
        assert_eq!(back, x);
    }
}
