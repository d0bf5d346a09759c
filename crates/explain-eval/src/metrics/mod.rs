//! Evaluation metrics for attribution maps.
//!
//! A metric is configured once and can then be called any number of times.
//! Each call runs a fixed life-cycle driven by the [`Evaluator`]:
//!
//! 1. inputs are brought into channel-first order and checked
//!    ([`Metric::validate_input`])
//! 2. missing attributions are generated with the call's explainer
//! 3. the metric prepares per-batch state ([`Metric::custom_preprocess`])
//! 4. attributions are normalised and/or made absolute
//! 5. every instance is evaluated ([`Metric::evaluate_instance`])
//! 6. the metric sees all results ([`Metric::custom_postprocess`])
//!
//! Metric instances hold no mutable state. Results are returned per call and
//! can be collected in a caller-owned [`History`].
//!
//! # Available Metrics
//!
//! - [`Continuity`]: correlation between the prediction trace and per-patch
//!   attribution traces under incremental perturbation

pub mod continuity;
mod engine;

use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::data::{axis, Instance, PreparedBatch};
use crate::error::{Result, ShapeError};
use crate::functions::{Aggregator, Normaliser, Perturbation};
use crate::utils::Parallelism;

pub use continuity::{Continuity, ContinuityConfig, ContinuityParams, ContinuityResult, ContinuityState};
pub use engine::{CallContext, CallOptions, Evaluator, History};

// =============================================================================
// Metric trait
// =============================================================================

/// Identifies a metric implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Continuity,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Continuity => "Continuity",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hooks a concrete metric plugs into the evaluation life-cycle.
///
/// Implementors must be `Sync`: with [`Parallelism::Parallel`] instances are
/// evaluated concurrently against shared per-batch state.
pub trait Metric: Sync {
    /// Per-instance result.
    type Output: Send;
    /// Per-batch state produced by [`custom_preprocess`](Self::custom_preprocess).
    type State: Sync;

    fn kind(&self) -> MetricKind;

    /// Name for logging.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Parameters shared by every metric.
    fn base(&self) -> &BaseParams;

    /// Check the channel-first input shape before any model or explainer call.
    fn validate_input(&self, _x_shape: &[usize]) -> Result<()> {
        Ok(())
    }

    /// Derive per-batch state. Runs before attributions are normalised.
    fn custom_preprocess(&self, ctx: &CallContext<'_>, batch: &PreparedBatch)
        -> Result<Self::State>;

    /// Evaluate one instance.
    fn evaluate_instance(
        &self,
        ctx: &CallContext<'_>,
        state: &Self::State,
        instance: Instance<'_>,
    ) -> Result<Self::Output>;

    /// Inspect the finished results. Side effects only.
    fn custom_postprocess(
        &self,
        _ctx: &CallContext<'_>,
        _state: &Self::State,
        _results: &[Self::Output],
    ) -> Result<()> {
        Ok(())
    }
}

/// A metric driven by perturbing its inputs.
pub trait PerturbationMetric: Metric {
    fn perturbation(&self) -> &Perturbation;
}

// =============================================================================
// BaseParams
// =============================================================================

/// Parameters shared by every metric.
#[derive(Debug, Clone)]
pub struct BaseParams {
    /// Take the absolute value of attributions.
    pub abs: bool,
    /// Normalise attributions with [`normaliser`](Self::normaliser).
    pub normalise: bool,
    pub normaliser: Normaliser,
    /// Whether predictions are softmax probabilities. A call may override it.
    pub softmax: bool,
    /// Collapse the per-instance scores with [`aggregator`](Self::aggregator).
    pub return_aggregate: bool,
    pub aggregator: Aggregator,
    pub display_progressbar: bool,
    /// Silence advisory warnings.
    pub disable_warnings: bool,
    /// How the per-instance loop runs.
    pub parallelism: Parallelism,
}

impl Default for BaseParams {
    fn default() -> Self {
        Self {
            abs: false,
            normalise: true,
            normaliser: Normaliser::by_negative(),
            softmax: false,
            return_aggregate: false,
            aggregator: Aggregator::mean(),
            display_progressbar: false,
            disable_warnings: false,
            parallelism: Parallelism::Sequential,
        }
    }
}

impl BaseParams {
    /// `[aggregate(scores)]` when `return_aggregate` is set, else `scores`.
    pub fn reduce(&self, scores: Vec<f64>) -> Vec<f64> {
        if self.return_aggregate {
            vec![self.aggregator.aggregate(&scores)]
        } else {
            scores
        }
    }

    /// Apply the configured normalisation and absolute value to one attribution.
    pub fn process_attribution(&self, a: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, ShapeError> {
        let mut out = if self.normalise {
            let normalised = self.normaliser.normalise(a.view());
            if normalised.shape() != a.shape() {
                return Err(ShapeError::Reshape {
                    len: normalised.len(),
                    shape: a.shape().to_vec(),
                });
            }
            normalised
        } else {
            a.to_owned()
        };
        if self.abs {
            out.mapv_inplace(f32::abs);
        }
        Ok(out)
    }

    /// Apply [`process_attribution`](Self::process_attribution) to every
    /// instance of a batch in place.
    pub fn process_batch(&self, a: &mut ArrayD<f32>) -> Result<(), ShapeError> {
        if !self.normalise && !self.abs {
            return Ok(());
        }
        for mut inst in a.axis_iter_mut(axis::BATCH) {
            let processed = self.process_attribution(inst.view())?;
            inst.assign(&processed);
        }
        Ok(())
    }

    pub fn summary(&self) -> BaseSummary {
        BaseSummary {
            abs: self.abs,
            normalise: self.normalise,
            normalise_func: self.normaliser.name(),
            softmax: self.softmax,
            return_aggregate: self.return_aggregate,
            aggregate_func: self.aggregator.name(),
            parallelism: self.parallelism,
        }
    }
}

/// Serializable snapshot of [`BaseParams`], without UI flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseSummary {
    pub abs: bool,
    pub normalise: bool,
    pub normalise_func: &'static str,
    pub softmax: bool,
    pub return_aggregate: bool,
    pub aggregate_func: &'static str,
    pub parallelism: Parallelism,
}

// =============================================================================
// MetricInfo
// =============================================================================

/// Human-readable description of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricInfo {
    pub kind: MetricKind,
    /// How to read the scores.
    pub interpretation: &'static str,
    /// Where the metric was introduced.
    pub citation: &'static str,
}

impl std::fmt::Display for MetricInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.interpretation, self.citation)
    }
}
