//! explain-eval: evaluation metrics for attribution maps.
//!
//! Quantifies how well an explanation method (saliency, gradients, ...)
//! behaves by running controlled perturbation experiments against the model
//! being explained and scoring the resulting attributions.
//!
//! # Key Types
//!
//! - [`Continuity`] / [`ContinuityConfig`] - Continuity metric and its builder
//! - [`Model`] / [`Predictor`] - Model backends and the uniform interface metrics call
//! - [`Explainer`] / [`Perturbation`] - Pluggable collaborator functions
//! - [`Batch`] - Inputs, labels, attributions and masks for one call
//! - [`MetricError`] - Everything that can go wrong during a call
//!
//! # Usage
//!
//! Configure a metric once with its builder, then call it with a model, a
//! batch and per-call [`CallOptions`]. See the [`metrics`] module for the
//! evaluation life-cycle.

// Re-export approx traits for users who want to compare scores
pub use approx;

pub mod data;
pub mod error;
pub mod functions;
pub mod metrics;
pub mod model;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Metrics
pub use metrics::{
    CallOptions, Continuity, ContinuityConfig, ContinuityResult, Evaluator, History, Metric,
    MetricKind,
};

// Data
pub use data::{Batch, Modality};

// Collaborators
pub use functions::{Aggregator, Baseline, Explainer, Normaliser, Perturbation, Similarity};
pub use model::{Device, FnModel, Model, PredictOptions, Predictor};

// Errors
pub use error::{ConfigError, MetricError, ModalityError, ShapeError};

// Shared utilities
pub use utils::Parallelism;
