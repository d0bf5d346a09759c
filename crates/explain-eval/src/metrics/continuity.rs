//! Continuity: robustness of attributions under incremental perturbation.
//!
//! Each instance is perturbed in `nr_steps` increasing steps. At every step
//! the attribution is regenerated, split into spatial patches and summed per
//! patch, and the model's score for the instance's label is recorded. The
//! aggregated score correlates the prediction trace with every patch trace:
//! an attribution that varies in step with the model output scores close
//! to 1.
//!
//! Montavon, Samek and Müller, "Methods for interpreting and understanding
//! deep neural networks", Digital Signal Processing 73 (2018).

use bon::Builder;
use ndarray::Array1;
use serde::Serialize;
use tracing::{info, trace, warn};

use super::{
    BaseParams, BaseSummary, CallContext, CallOptions, Evaluator, History, Metric, MetricInfo,
    MetricKind, PerturbationMetric,
};
use crate::data::{
    axis, check_attributions, check_patch_size, expand_attribution_channel, Batch, Instance,
    Modality, PatchGrid, PreparedBatch,
};
use crate::error::{ConfigError, Result, ShapeError};
use crate::functions::{Baseline, Normaliser, PerturbArgs, Perturbation, Similarity};
use crate::model::{Model, Predictor};
use crate::utils::{argmax, nan_to_num};

// =============================================================================
// ContinuityConfig
// =============================================================================

/// Configuration of the [`Continuity`] metric.
///
/// # Example
///
/// ```
/// use explain_eval::data::Modality;
/// use explain_eval::metrics::ContinuityConfig;
///
/// let config = ContinuityConfig::builder()
///     .patch_size(4)
///     .nr_steps(10)
///     .modality(Modality::Image)
///     .return_nan_when_prediction_changes(true)
///     .build()
///     .unwrap();
/// assert!(config.base.abs);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ContinuityConfig {
    /// Shared parameters. Default: abs and max-normalised attributions.
    #[builder(default = ContinuityConfig::default_base())]
    pub base: BaseParams,

    /// Default: translation along the last axis, black baseline.
    #[builder(default = Perturbation::translation_x_direction(Baseline::Black))]
    pub perturbation: Perturbation,

    /// Compares the prediction trace to each patch trace. Default: Pearson.
    #[builder(default = Similarity::pearson())]
    pub similarity: Similarity,

    /// Number of perturbation steps. Default: 28.
    #[builder(default = 28)]
    pub nr_steps: usize,

    /// Side length of a patch. Must evenly divide every spatial extent.
    /// Default: 7.
    #[builder(default = 7)]
    pub patch_size: usize,

    #[builder(default)]
    pub modality: Modality,

    /// Record NaN for every patch of a step whose top-1 class differs from
    /// the unperturbed input's.
    #[builder(default)]
    pub return_nan_when_prediction_changes: bool,
}

impl<S: continuity_config_builder::IsComplete> ContinuityConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidNrSteps`] if `nr_steps == 0`
    /// - [`ConfigError::InvalidPatchSize`] if `patch_size == 0`
    pub fn build(self) -> Result<ContinuityConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl ContinuityConfig {
    /// Shared parameters continuity starts from.
    pub fn default_base() -> BaseParams {
        BaseParams {
            abs: true,
            normalise: true,
            normaliser: Normaliser::by_max(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.nr_steps == 0 {
            return Err(ConfigError::InvalidNrSteps(self.nr_steps));
        }
        if self.patch_size == 0 {
            return Err(ConfigError::InvalidPatchSize(self.patch_size));
        }
        Ok(())
    }
}

/// Serializable snapshot of a [`ContinuityConfig`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityParams {
    #[serde(flatten)]
    pub base: BaseSummary,
    pub perturb_func: &'static str,
    pub similarity_func: &'static str,
    pub nr_steps: usize,
    pub patch_size: usize,
    pub modality: Modality,
    pub return_nan_when_prediction_changes: bool,
}

// =============================================================================
// Results
// =============================================================================

/// Per-batch state shared by every instance.
#[derive(Debug, Clone)]
pub struct ContinuityState {
    /// Number of patches; also the key of the prediction trace.
    pub nr_patches: usize,
    /// Perturbation increment per step.
    pub dx: usize,
    pub grid: PatchGrid,
}

/// Traces of one instance.
///
/// Patch keys run `0..nr_patches`; key `nr_patches` is the prediction trace.
/// Every trace holds one value per step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuityResult {
    patch_traces: Vec<Vec<f64>>,
    prediction_trace: Vec<f64>,
}

impl ContinuityResult {
    pub fn new(patch_traces: Vec<Vec<f64>>, prediction_trace: Vec<f64>) -> Self {
        Self {
            patch_traces,
            prediction_trace,
        }
    }

    pub fn nr_patches(&self) -> usize {
        self.patch_traces.len()
    }

    pub fn nr_steps(&self) -> usize {
        self.prediction_trace.len()
    }

    /// Trace under `key`. Key `nr_patches()` is the prediction trace.
    pub fn trace(&self, key: usize) -> Option<&[f64]> {
        if key == self.patch_traces.len() {
            Some(&self.prediction_trace)
        } else {
            self.patch_traces.get(key).map(Vec::as_slice)
        }
    }

    /// Summed patch attribution per step.
    pub fn patch_trace(&self, patch: usize) -> Option<&[f64]> {
        self.patch_traces.get(patch).map(Vec::as_slice)
    }

    /// Model score for the label per step.
    pub fn prediction_trace(&self) -> &[f64] {
        &self.prediction_trace
    }

    /// Mean similarity between the prediction trace and every patch trace.
    ///
    /// A patch trace holding any NaN contributes exactly 0, as does a NaN
    /// similarity.
    pub fn score(&self, similarity: &Similarity) -> f64 {
        if self.patch_traces.is_empty() {
            return f64::NAN;
        }
        let total: f64 = self
            .patch_traces
            .iter()
            .map(|patch| {
                if patch.iter().any(|v| v.is_nan()) {
                    0.0
                } else {
                    nan_to_num(similarity.compute(&self.prediction_trace, patch))
                }
            })
            .sum();
        total / self.patch_traces.len() as f64
    }
}

// =============================================================================
// Continuity
// =============================================================================

/// The continuity metric.
#[derive(Debug, Clone)]
pub struct Continuity {
    config: ContinuityConfig,
}

impl Continuity {
    pub fn new(config: ContinuityConfig) -> Self {
        if !config.base.disable_warnings {
            warn!(
                metric = "Continuity",
                "results are sensitive to the number of patches ('patch_size'), the number of \
                 steps ('nr_steps'), the baseline the perturbation fills with and the \
                 direction it translates in; the default perturbation suits image data only"
            );
        }
        Self { config }
    }

    pub fn config(&self) -> &ContinuityConfig {
        &self.config
    }

    pub fn info() -> MetricInfo {
        MetricInfo {
            kind: MetricKind::Continuity,
            interpretation: "higher is better; values near 1 mean attributions change in step \
                             with the model's prediction as the input is perturbed",
            citation: "Montavon, Samek and Müller, 'Methods for interpreting and understanding \
                       deep neural networks', Digital Signal Processing 73, 1-15 (2018)",
        }
    }

    /// Effective configuration.
    pub fn params(&self) -> ContinuityParams {
        let c = &self.config;
        ContinuityParams {
            base: c.base.summary(),
            perturb_func: c.perturbation.name(),
            similarity_func: c.similarity.name(),
            nr_steps: c.nr_steps,
            patch_size: c.patch_size,
            modality: c.modality,
            return_nan_when_prediction_changes: c.return_nan_when_prediction_changes,
        }
    }

    /// Per-instance traces for `batch`.
    pub fn evaluate(
        &self,
        model: &dyn Model,
        batch: Batch,
        options: &CallOptions,
    ) -> Result<Vec<ContinuityResult>> {
        Evaluator::new(self).evaluate(model, batch, options)
    }

    /// [`evaluate`](Self::evaluate), recording the results in `history`.
    pub fn evaluate_into<'h>(
        &self,
        model: &dyn Model,
        batch: Batch,
        options: &CallOptions,
        history: &'h mut History<ContinuityResult>,
    ) -> Result<&'h [ContinuityResult]> {
        Evaluator::new(self).evaluate_into(model, batch, options, history)
    }

    /// Continuity score per instance.
    pub fn aggregated_score(&self, results: &[ContinuityResult]) -> Vec<f64> {
        results
            .iter()
            .map(|r| r.score(&self.config.similarity))
            .collect()
    }

    /// Evaluate, score and reduce.
    ///
    /// Returns one score per instance, or a single aggregate when
    /// `return_aggregate` is set.
    pub fn score(&self, model: &dyn Model, batch: Batch, options: &CallOptions) -> Result<Vec<f64>> {
        let results = self.evaluate(model, batch, options)?;
        Ok(self.config.base.reduce(self.aggregated_score(&results)))
    }
}

impl Metric for Continuity {
    type Output = ContinuityResult;
    type State = ContinuityState;

    fn kind(&self) -> MetricKind {
        MetricKind::Continuity
    }

    fn base(&self) -> &BaseParams {
        &self.config.base
    }

    fn validate_input(&self, x_shape: &[usize]) -> Result<()> {
        let instance_shape = x_shape.get(axis::CHANNEL.index()..).unwrap_or(&[]);
        self.config.modality.check_instance(instance_shape)?;
        check_patch_size(self.config.patch_size, &instance_shape[axis::FIRST_SPATIAL..])?;
        Ok(())
    }

    fn custom_preprocess(&self, ctx: &CallContext<'_>, batch: &PreparedBatch) -> Result<ContinuityState> {
        ctx.require_explainer()?;
        if batch.y.is_none() {
            return Err(ConfigError::MissingLabels.into());
        }

        let instance_shape = batch.instance_shape();
        let grid = self
            .config
            .modality
            .partition(instance_shape, self.config.patch_size)?;
        let nr_patches = grid.len();
        let spatial_len: usize = instance_shape[axis::FIRST_SPATIAL..].iter().product();
        let dx = spatial_len / self.config.nr_steps;

        info!(
            modality = %self.config.modality,
            nr_patches,
            dx,
            nr_steps = self.config.nr_steps,
            "continuity patch grid ready"
        );
        Ok(ContinuityState {
            nr_patches,
            dx,
            grid,
        })
    }

    fn evaluate_instance(
        &self,
        ctx: &CallContext<'_>,
        state: &ContinuityState,
        instance: Instance<'_>,
    ) -> Result<ContinuityResult> {
        let config = &self.config;
        let base = &config.base;
        let model = ctx.model();
        let explainer = ctx.require_explainer()?;
        let label = instance.y.ok_or(ConfigError::MissingLabels)?;

        let x = instance.x;
        let shape = x.shape().to_vec();
        let indices: Vec<usize> = (0..x.len()).collect();
        let indexed_axes: Vec<usize> = (0..x.ndim()).collect();
        let dx_max = state.dx * config.nr_steps;
        let targets = Array1::from_elem(1, label);

        let original_class = if config.return_nan_when_prediction_changes {
            let x_orig = model.shape_input(x.view(), &shape, true)?;
            argmax(model.predict(x_orig.view())?.row(0))
        } else {
            None
        };

        let mut patch_traces = vec![Vec::with_capacity(config.nr_steps); state.nr_patches];
        let mut prediction_trace = Vec::with_capacity(config.nr_steps);

        for step in 0..config.nr_steps {
            let dx_step = (step + 1) * state.dx;
            let args = PerturbArgs {
                indices: &indices,
                indexed_axes: &indexed_axes,
                perturb_dx: dx_step,
                dx_max,
            };
            let x_perturbed = config.perturbation.perturb(x.view(), &args);
            if x_perturbed.shape() != shape.as_slice() {
                return Err(ShapeError::PerturbedShape {
                    expected: shape,
                    got: x_perturbed.shape().to_vec(),
                }
                .into());
            }
            let x_input = model.shape_input(x_perturbed.view(), &shape, true)?;

            let scores = model.predict(x_input.view())?;
            let changed = config.return_nan_when_prediction_changes
                && argmax(scores.row(0)) != original_class;

            let a_perturbed = explainer.explain(model, x_input.view(), targets.view())?;
            let a_perturbed = expand_attribution_channel(a_perturbed, x_input.shape())?;
            check_attributions(x_input.shape(), a_perturbed.shape())?;
            let a_perturbed = base.process_attribution(a_perturbed.index_axis(axis::BATCH, 0))?;

            let y_score = scores
                .get((0, label))
                .copied()
                .ok_or(ShapeError::LabelOutOfRange {
                    label,
                    n_classes: scores.ncols(),
                })?;
            prediction_trace.push(y_score as f64);
            trace!(
                instance = instance.index,
                step,
                dx = dx_step,
                changed,
                "continuity step"
            );

            let a_view = a_perturbed.view();
            for (p, patch_trace) in patch_traces.iter_mut().enumerate() {
                if changed {
                    patch_trace.push(f64::NAN);
                    continue;
                }
                let patch = state.grid.extract(&a_view, p)?;
                let sum = if base.normalise || base.abs {
                    base.process_attribution(patch)?.sum()
                } else {
                    patch.sum()
                };
                patch_trace.push(sum as f64);
            }
        }

        Ok(ContinuityResult::new(patch_traces, prediction_trace))
    }
}

impl PerturbationMetric for Continuity {
    fn perturbation(&self) -> &Perturbation {
        &self.config.perturbation
    }
}
