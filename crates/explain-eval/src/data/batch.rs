//! Input batches and per-instance views.

use ndarray::{Array1, ArrayD, ArrayViewD};

use super::layout::axis;
use crate::error::ShapeError;

/// A batch handed to a metric call.
///
/// `x` may be in either channel order; the engine converts it to
/// channel-first. `a` may omit the channel axis.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Inputs, instance axis first.
    pub x: ArrayD<f32>,
    /// Class label per instance.
    pub y: Option<Array1<usize>>,
    /// Precomputed attributions. Generated by the explainer when absent.
    pub a: Option<ArrayD<f32>>,
    /// Segmentation masks.
    pub s: Option<ArrayD<f32>>,
}

impl Batch {
    /// Batch with inputs only.
    pub fn new(x: ArrayD<f32>) -> Self {
        Self {
            x,
            y: None,
            a: None,
            s: None,
        }
    }

    pub fn with_labels(mut self, y: Array1<usize>) -> Self {
        self.y = Some(y);
        self
    }

    pub fn with_attributions(mut self, a: ArrayD<f32>) -> Self {
        self.a = Some(a);
        self
    }

    pub fn with_segmentations(mut self, s: ArrayD<f32>) -> Self {
        self.s = Some(s);
        self
    }

    /// Number of instances.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.shape().first().copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch after preprocessing: channel-first inputs and attributions whose
/// shapes are known to agree.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub x: ArrayD<f32>,
    pub y: Option<Array1<usize>>,
    pub a: ArrayD<f32>,
    pub s: Option<ArrayD<f32>>,
}

impl PreparedBatch {
    /// Assemble a prepared batch, checking label and mask counts.
    pub fn new(
        x: ArrayD<f32>,
        y: Option<Array1<usize>>,
        a: ArrayD<f32>,
        s: Option<ArrayD<f32>>,
    ) -> Result<Self, ShapeError> {
        let n = x.len_of(axis::BATCH);
        if let Some(y) = &y {
            if y.len() != n {
                return Err(ShapeError::BatchSize { x: n, other: y.len() });
            }
        }
        if let Some(s) = &s {
            let got = s.shape().first().copied().unwrap_or(0);
            if got != n {
                return Err(ShapeError::BatchSize { x: n, other: got });
            }
        }
        Ok(Self { x, y, a, s })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.x.len_of(axis::BATCH)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channel-first shape of one instance.
    pub fn instance_shape(&self) -> &[usize] {
        &self.x.shape()[axis::CHANNEL.index()..]
    }

    /// View of instance `index`.
    ///
    /// Missing segmentations yield `s = None`.
    pub fn instance(&self, index: usize) -> Instance<'_> {
        Instance {
            index,
            x: self.x.index_axis(axis::BATCH, index),
            y: self.y.as_ref().map(|y| y[index]),
            a: self.a.index_axis(axis::BATCH, index),
            s: self.s.as_ref().map(|s| s.index_axis(axis::BATCH, index)),
        }
    }
}

/// Borrowed data of a single instance.
#[derive(Debug, Clone)]
pub struct Instance<'a> {
    /// Position in the batch.
    pub index: usize,
    pub x: ArrayViewD<'a, f32>,
    pub y: Option<usize>,
    pub a: ArrayViewD<'a, f32>,
    pub s: Option<ArrayViewD<'a, f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    #[test]
    fn instances_follow_batch_order() {
        let x = ArrayD::from_shape_fn(IxDyn(&[3, 1, 2, 2]), |ix| ix[0] as f32);
        let a = ArrayD::<f32>::ones(IxDyn(&[3, 1, 2, 2]));
        let batch = PreparedBatch::new(x, Some(array![0, 1, 2]), a, None).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.instance_shape(), &[1, 2, 2]);
        for i in 0..3 {
            let inst = batch.instance(i);
            assert_eq!(inst.index, i);
            assert_eq!(inst.y, Some(i));
            assert_eq!(inst.x[[0, 0, 0]], i as f32);
            assert!(inst.s.is_none());
        }
    }

    #[test]
    fn label_count_must_match() {
        let x = ArrayD::<f32>::zeros(IxDyn(&[2, 1, 2, 2]));
        let a = x.clone();
        let err = PreparedBatch::new(x, Some(array![0]), a, None).unwrap_err();
        assert_eq!(err, ShapeError::BatchSize { x: 2, other: 1 });
    }
}
