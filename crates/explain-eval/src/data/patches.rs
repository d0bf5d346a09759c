//! Patch partitioning of spatial axes.
//!
//! A patch is a rectangular (or cubic) sub-region of an instance's spatial
//! axes that spans every channel. Patches are enumerated in raster order:
//! the row-major product of per-axis offsets, last axis fastest.

use std::ops::Range;

use ndarray::{ArrayViewD, Slice};

use super::layout::axis;
use crate::error::{ConfigError, Result};

/// Build per-axis index ranges for a patch at `coords`.
///
/// A single-element `patch_size` is broadcast to every coordinate.
pub fn create_patch_slice(
    patch_size: &[usize],
    coords: &[usize],
) -> Result<Vec<Range<usize>>, ConfigError> {
    let sizes: Vec<usize> = if patch_size.len() == 1 && coords.len() != 1 {
        vec![patch_size[0]; coords.len()]
    } else if patch_size.len() == coords.len() {
        patch_size.to_vec()
    } else {
        return Err(ConfigError::PatchRankMismatch {
            patch_dims: patch_size.len(),
            expected: coords.len(),
        });
    };

    Ok(coords
        .iter()
        .zip(sizes)
        .map(|(&start, size)| start..start + size)
        .collect())
}

/// Expand a patch slice over `axes` into ranges for every axis of `shape`.
///
/// Axes not listed in `axes` are taken whole. Ranges are clipped to the
/// axis extent, so a patch running past the end is truncated (possibly to
/// an empty range).
pub fn expand_indices(
    shape: &[usize],
    patch_slice: &[Range<usize>],
    axes: &[usize],
) -> Result<Vec<Range<usize>>, ConfigError> {
    if patch_slice.len() != axes.len() || axes.iter().any(|&ax| ax >= shape.len()) {
        return Err(ConfigError::PatchRankMismatch {
            patch_dims: patch_slice.len(),
            expected: axes.len().min(shape.len()),
        });
    }

    let mut ranges: Vec<Range<usize>> = shape.iter().map(|&extent| 0..extent).collect();
    for (range, &ax) in patch_slice.iter().zip(axes) {
        let extent = shape[ax];
        ranges[ax] = range.start.min(extent)..range.end.min(extent);
    }
    Ok(ranges)
}

/// Number of patches of side `patch_size` covering `shape`.
///
/// With `overlap`, a trailing partial patch on an axis is counted (ceil);
/// without it only whole patches are (floor). Both agree when `patch_size`
/// tiles the shape.
pub fn nr_patches(shape: &[usize], patch_size: usize, overlap: bool) -> usize {
    if patch_size == 0 {
        return 0;
    }
    shape
        .iter()
        .map(|&extent| {
            if overlap {
                extent.div_ceil(patch_size)
            } else {
                extent / patch_size
            }
        })
        .product()
}

/// Check that `patch_size` evenly divides every extent of `shape`.
pub fn check_patch_size(patch_size: usize, shape: &[usize]) -> Result<(), ConfigError> {
    if patch_size == 0 {
        return Err(ConfigError::InvalidPatchSize(patch_size));
    }
    if shape.iter().any(|&extent| extent % patch_size != 0) {
        return Err(ConfigError::PatchSizeMismatch {
            patch_size,
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

// =============================================================================
// PatchGrid
// =============================================================================

/// Ordered set of patches over the spatial axes of one instance.
///
/// Each entry holds one range per spatial axis. Instance axis 0 is the
/// channel axis and is always taken whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchGrid {
    patches: Vec<Vec<Range<usize>>>,
    spatial_axes: Vec<usize>,
    instance_shape: Vec<usize>,
}

impl PatchGrid {
    /// Tile every spatial axis with patches of side `patch_size`.
    ///
    /// `instance_shape` is channel-first with the batch axis stripped.
    pub fn tiled(instance_shape: &[usize], patch_size: usize) -> Result<Self, ConfigError> {
        if patch_size == 0 {
            return Err(ConfigError::InvalidPatchSize(patch_size));
        }
        let spatial_axes: Vec<usize> = (axis::FIRST_SPATIAL..instance_shape.len()).collect();

        let mut coords: Vec<Vec<usize>> = vec![Vec::new()];
        for &ax in &spatial_axes {
            let offsets: Vec<usize> = (0..instance_shape[ax]).step_by(patch_size).collect();
            coords = coords
                .into_iter()
                .flat_map(|prefix| {
                    offsets.iter().map(move |&offset| {
                        let mut c = prefix.clone();
                        c.push(offset);
                        c
                    })
                })
                .collect();
        }

        let patches = coords
            .iter()
            .map(|c| create_patch_slice(&[patch_size], c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patches,
            spatial_axes,
            instance_shape: instance_shape.to_vec(),
        })
    }

    /// `count` consecutive windows of `patch_size` along the first spatial axis.
    ///
    /// Windows past the end of the axis are clipped and may be empty.
    pub fn windows(
        instance_shape: &[usize],
        patch_size: usize,
        count: usize,
    ) -> Result<Self, ConfigError> {
        if patch_size == 0 {
            return Err(ConfigError::InvalidPatchSize(patch_size));
        }
        let patches = (0..count)
            .map(|i| create_patch_slice(&[patch_size], &[i * patch_size]))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patches,
            spatial_axes: vec![axis::FIRST_SPATIAL],
            instance_shape: instance_shape.to_vec(),
        })
    }

    /// Number of patches.
    #[inline]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether the grid has no patches.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Instance axes the patches index into.
    pub fn spatial_axes(&self) -> &[usize] {
        &self.spatial_axes
    }

    /// Raw (unclipped) spatial ranges of patch `index`.
    pub fn patch(&self, index: usize) -> Option<&[Range<usize>]> {
        self.patches.get(index).map(Vec::as_slice)
    }

    /// View of patch `index` within an instance-shaped array.
    ///
    /// `arr` may have any channel count; only its spatial axes are indexed.
    pub fn extract<'a>(
        &self,
        arr: &'a ArrayViewD<'_, f32>,
        index: usize,
    ) -> Result<ArrayViewD<'a, f32>, ConfigError> {
        let patch = self.patches.get(index).ok_or(ConfigError::PatchIndex {
            index,
            nr_patches: self.patches.len(),
        })?;
        let ranges = expand_indices(arr.shape(), patch, &self.spatial_axes)?;
        Ok(arr.slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone())))
    }

    /// Number of elements covered by patch `index` in the instance shape.
    pub fn area(&self, index: usize) -> usize {
        match self.patches.get(index) {
            Some(patch) => expand_indices(&self.instance_shape, patch, &self.spatial_axes)
                .map(|ranges| ranges.iter().map(|r| r.len()).product())
                .unwrap_or(0),
            None => 0,
        }
    }
}
