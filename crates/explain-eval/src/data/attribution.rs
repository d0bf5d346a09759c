//! Attribution shape handling.

use ndarray::{ArrayD, ArrayViewD};

use super::layout::axis;
use crate::error::ShapeError;

/// Give attributions the channel axis of the inputs they explain.
///
/// Attributions that were summed over channels (rank one less than `x`)
/// get a size-1 channel axis inserted at position 1. Attributions that
/// already have `x`'s rank are returned as-is.
pub fn expand_attribution_channel(
    a: ArrayD<f32>,
    x_shape: &[usize],
) -> Result<ArrayD<f32>, ShapeError> {
    let (a_len, x_len) = (a.shape().first().copied(), x_shape.first().copied());
    if a_len != x_len {
        return Err(ShapeError::BatchSize {
            x: x_len.unwrap_or(0),
            other: a_len.unwrap_or(0),
        });
    }

    if a.ndim() == x_shape.len() {
        Ok(a)
    } else if a.ndim() + 1 == x_shape.len() {
        Ok(a.insert_axis(axis::CHANNEL))
    } else {
        Err(ShapeError::Rank {
            x: x_shape.len(),
            a: a.ndim(),
        })
    }
}

/// Check that attributions fit the inputs after channel expansion.
///
/// Batch size, rank and spatial extents must agree; the channel axis must
/// be 1 or equal to the input channel count.
pub fn check_attributions(x_shape: &[usize], a_shape: &[usize]) -> Result<(), ShapeError> {
    if x_shape.len() != a_shape.len() {
        return Err(ShapeError::Rank {
            x: x_shape.len(),
            a: a_shape.len(),
        });
    }
    if x_shape.len() < 3 {
        return Err(ShapeError::UnsupportedRank(x_shape.len()));
    }
    if x_shape[0] != a_shape[0] {
        return Err(ShapeError::BatchSize {
            x: x_shape[0],
            other: a_shape[0],
        });
    }
    if x_shape[2..] != a_shape[2..] {
        return Err(ShapeError::Spatial {
            x: x_shape[2..].to_vec(),
            a: a_shape[2..].to_vec(),
        });
    }
    let c = axis::CHANNEL.index();
    if a_shape[c] != 1 && a_shape[c] != x_shape[c] {
        return Err(ShapeError::Channels {
            x: x_shape[c],
            a: a_shape[c],
        });
    }
    Ok(())
}

/// Whether every element equals the first one.
///
/// Empty arrays count as constant.
pub fn is_constant(a: ArrayViewD<'_, f32>) -> bool {
    let mut iter = a.iter();
    match iter.next() {
        Some(&first) => iter.all(|&v| v == first),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn inserts_missing_channel_axis() {
        let a = ArrayD::<f32>::zeros(IxDyn(&[2, 4, 4]));
        let expanded = expand_attribution_channel(a, &[2, 3, 4, 4]).unwrap();
        assert_eq!(expanded.shape(), &[2, 1, 4, 4]);
    }

    #[test]
    fn keeps_matching_rank() {
        let a = ArrayD::<f32>::zeros(IxDyn(&[2, 3, 4, 4]));
        let expanded = expand_attribution_channel(a, &[2, 3, 4, 4]).unwrap();
        assert_eq!(expanded.shape(), &[2, 3, 4, 4]);
    }

    #[test]
    fn rejects_batch_and_rank_mismatch() {
        let a = ArrayD::<f32>::zeros(IxDyn(&[3, 4, 4]));
        assert!(matches!(
            expand_attribution_channel(a, &[2, 1, 4, 4]),
            Err(ShapeError::BatchSize { x: 2, other: 3 })
        ));

        let a = ArrayD::<f32>::zeros(IxDyn(&[2, 16]));
        assert!(matches!(
            expand_attribution_channel(a, &[2, 1, 4, 4]),
            Err(ShapeError::Rank { x: 4, a: 2 })
        ));
    }

    #[test]
    fn check_attributions_accepts_single_channel() {
        assert!(check_attributions(&[2, 3, 4, 4], &[2, 1, 4, 4]).is_ok());
        assert!(check_attributions(&[2, 3, 4, 4], &[2, 3, 4, 4]).is_ok());
    }

    #[test]
    fn check_attributions_rejects_mismatches() {
        assert!(matches!(
            check_attributions(&[2, 3, 4, 4], &[2, 2, 4, 4]),
            Err(ShapeError::Channels { x: 3, a: 2 })
        ));
        assert!(matches!(
            check_attributions(&[2, 1, 4, 4], &[2, 1, 4, 5]),
            Err(ShapeError::Spatial { .. })
        ));
    }

    #[test]
    fn constant_detection() {
        let a = ArrayD::<f32>::from_elem(IxDyn(&[2, 2]), 1.0);
        assert!(is_constant(a.view()));
        let mut b = a.clone();
        b[[1, 1]] = 2.0;
        assert!(!is_constant(b.view()));
    }
}
