//! Data modalities and their patch partition policies.

use serde::{Deserialize, Serialize};

use super::layout::axis;
use super::patches::{check_patch_size, nr_patches, PatchGrid};
use crate::error::{ConfigError, ModalityError};

/// Kind of data an instance represents.
///
/// The modality fixes the expected channel-first instance layout and how
/// the spatial axes are split into patches:
///
/// | Modality | Instance layout | Patches |
/// |---|---|---|
/// | `Image` | `(C, H, W)` | `ps × ps` squares, tiling count over `(H, W)` |
/// | `PointCloud` | `(C, N)` | windows of `ps` points, `N / ps + 1` of them |
/// | `Volume` | `(C, D, H, W)` | `ps³` cubes, `(extent / ps)³` for cubic volumes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Modality {
    #[default]
    Image,
    #[serde(rename = "Point_Cloud")]
    PointCloud,
    Volume,
}

impl Modality {
    /// Canonical tag.
    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::PointCloud => "Point_Cloud",
            Self::Volume => "Volume",
        }
    }

    /// Rank of a single channel-first instance.
    pub fn instance_rank(self) -> usize {
        match self {
            Self::Image => 3,
            Self::PointCloud => 2,
            Self::Volume => 4,
        }
    }

    /// Check a channel-first instance shape against this modality.
    pub fn check_instance(self, instance_shape: &[usize]) -> Result<(), ModalityError> {
        let expected = self.instance_rank();
        if instance_shape.len() != expected {
            return Err(ModalityError::Rank {
                modality: self.name(),
                expected,
                got: instance_shape.len(),
            });
        }
        Ok(())
    }

    /// Number of patches for the given spatial extents.
    pub fn nr_patches(self, spatial_shape: &[usize], patch_size: usize) -> usize {
        match self {
            Self::Image => nr_patches(spatial_shape, patch_size, true),
            Self::PointCloud => nr_patches(spatial_shape, patch_size, false) + 1,
            Self::Volume => nr_patches(spatial_shape, patch_size, false),
        }
    }

    /// Partition a channel-first instance shape into patches.
    ///
    /// Fails if `patch_size` does not evenly tile the spatial extents.
    pub fn partition(
        self,
        instance_shape: &[usize],
        patch_size: usize,
    ) -> Result<PatchGrid, ConfigError> {
        let spatial = &instance_shape[axis::FIRST_SPATIAL.min(instance_shape.len())..];
        check_patch_size(patch_size, spatial)?;
        match self {
            Self::Image | Self::Volume => PatchGrid::tiled(instance_shape, patch_size),
            Self::PointCloud => PatchGrid::windows(
                instance_shape,
                patch_size,
                self.nr_patches(spatial, patch_size),
            ),
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Modality {
    type Err = ModalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "point_cloud" | "pointcloud" => Ok(Self::PointCloud),
            "volume" => Ok(Self::Volume),
            _ => Err(ModalityError::Unknown(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Image", Modality::Image)]
    #[case("Point_Cloud", Modality::PointCloud)]
    #[case("volume", Modality::Volume)]
    fn parses_tags(#[case] tag: &str, #[case] expected: Modality) {
        assert_eq!(tag.parse::<Modality>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(
            "Audio".parse::<Modality>(),
            Err(ModalityError::Unknown("Audio".into()))
        );
    }

    #[test]
    fn grid_len_matches_nr_patches() {
        let image = Modality::Image.partition(&[3, 28, 28], 7).unwrap();
        assert_eq!(image.len(), Modality::Image.nr_patches(&[28, 28], 7));
        assert_eq!(image.len(), 16);

        let cloud = Modality::PointCloud.partition(&[3, 12], 4).unwrap();
        assert_eq!(cloud.len(), 4);

        let volume = Modality::Volume.partition(&[1, 4, 4, 4], 2).unwrap();
        assert_eq!(volume.len(), 8);
    }

    #[test]
    fn partition_requires_tiling() {
        assert!(matches!(
            Modality::Image.partition(&[1, 28, 28], 5),
            Err(ConfigError::PatchSizeMismatch { patch_size: 5, .. })
        ));
    }

    #[test]
    fn instance_rank_is_checked() {
        assert!(Modality::Image.check_instance(&[1, 4, 4]).is_ok());
        assert_eq!(
            Modality::Volume.check_instance(&[1, 4, 4]),
            Err(ModalityError::Rank {
                modality: "Volume",
                expected: 4,
                got: 3
            })
        );
    }
}
