//! Error types for metric evaluation.
//!
//! Every error is fatal for the call that raised it. Steps invalidated by a
//! prediction change are not errors; they show up as NaN entries in the
//! per-instance results.

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid metric configuration or a collaborator missing when it is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No explanation function was supplied but one is required.
    MissingExplainFn,
    /// Labels are required by this metric (or to generate explanations).
    MissingLabels,
    /// Number of perturbation steps must be at least 1.
    InvalidNrSteps(usize),
    /// Patch size must be at least 1.
    InvalidPatchSize(usize),
    /// Patch size does not evenly tile the spatial shape.
    PatchSizeMismatch { patch_size: usize, shape: Vec<usize> },
    /// A patch size sequence and a coordinate/shape sequence disagree in length.
    PatchRankMismatch { patch_dims: usize, expected: usize },
    /// Patch index past the end of the patch grid.
    PatchIndex { index: usize, nr_patches: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingExplainFn => write!(
                f,
                "an explanation function is required but none was given"
            ),
            Self::MissingLabels => write!(f, "labels (y_batch) are required"),
            Self::InvalidNrSteps(v) => write!(f, "nr_steps must be at least 1, got {}", v),
            Self::InvalidPatchSize(v) => write!(f, "patch_size must be at least 1, got {}", v),
            Self::PatchSizeMismatch { patch_size, shape } => write!(
                f,
                "patch_size {} does not evenly divide the spatial shape {:?}",
                patch_size, shape
            ),
            Self::PatchRankMismatch {
                patch_dims,
                expected,
            } => write!(
                f,
                "patch size has {} dimensions but {} were expected",
                patch_dims, expected
            ),
            Self::PatchIndex { index, nr_patches } => write!(
                f,
                "patch index {} is out of range for a grid of {} patches",
                index, nr_patches
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// ShapeError
// =============================================================================

/// Array shapes that do not fit together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("batch sizes differ: x has {x} instances, other has {other}")]
    BatchSize { x: usize, other: usize },

    #[error("attributions have rank {a} but inputs have rank {x}")]
    Rank { x: usize, a: usize },

    #[error("spatial shapes differ: x {x:?}, attributions {a:?}")]
    Spatial { x: Vec<usize>, a: Vec<usize> },

    #[error("attributions have {a} channels, expected 1 or {x}")]
    Channels { x: usize, a: usize },

    #[error("cannot infer channel order from shape {0:?}")]
    AmbiguousLayout(Vec<usize>),

    #[error("unsupported input rank {0}: expected a batch of at least 1-d multi-channel inputs")]
    UnsupportedRank(usize),

    #[error("label {label} out of range for {n_classes} model outputs")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("perturbation changed the instance shape from {expected:?} to {got:?}")]
    PerturbedShape { expected: Vec<usize>, got: Vec<usize> },

    #[error("cannot reshape {len} elements into {shape:?}")]
    Reshape { len: usize, shape: Vec<usize> },

    #[error("model returned {got} rows for a batch of {expected}")]
    PredictionRows { expected: usize, got: usize },
}

// =============================================================================
// ModalityError
// =============================================================================

/// Unsupported data modality.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModalityError {
    #[error("unknown modality '{0}' (expected Image, Point_Cloud or Volume)")]
    Unknown(String),

    #[error("{modality} instances must have rank {expected} (channel-first), got {got}")]
    Rank {
        modality: &'static str,
        expected: usize,
        got: usize,
    },
}

// =============================================================================
// MetricError
// =============================================================================

/// Error returned by metric evaluation.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Modality(#[from] ModalityError),

    /// The model backend failed to produce predictions.
    #[error("model failed: {0}")]
    Model(String),

    /// The explanation function failed.
    #[error("explanation function failed: {0}")]
    Explain(String),
}

/// Result alias used across the crate.
pub type Result<T, E = MetricError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::PatchSizeMismatch {
            patch_size: 3,
            shape: vec![4, 4],
        };
        assert_eq!(
            err.to_string(),
            "patch_size 3 does not evenly divide the spatial shape [4, 4]"
        );
    }

    #[test]
    fn metric_error_is_transparent() {
        let err: MetricError = ConfigError::MissingExplainFn.into();
        assert!(matches!(err, MetricError::Config(ConfigError::MissingExplainFn)));
        assert_eq!(
            err.to_string(),
            "an explanation function is required but none was given"
        );
    }
}
