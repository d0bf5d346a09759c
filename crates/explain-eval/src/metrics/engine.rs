//! The evaluation life-cycle shared by every metric.

use bon::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{ArrayD, ArrayView1, ArrayViewD};
use serde::Serialize;
use tracing::{debug, warn};

use super::Metric;
use crate::data::{
    check_attributions, expand_attribution_channel, infer_channel_first, is_constant,
    make_channel_first, Batch, PreparedBatch,
};
use crate::error::{ConfigError, Result};
use crate::functions::Explainer;
use crate::model::{Device, Model, ModelAdapter, PredictOptions, Predictor};

// =============================================================================
// CallOptions
// =============================================================================

/// Settings scoped to a single metric call.
///
/// Each set field wins over the metric's configured default for that call
/// only; nothing is written back to the metric.
///
/// # Example
///
/// ```
/// use explain_eval::metrics::CallOptions;
/// use explain_eval::model::Device;
///
/// let options = CallOptions::builder()
///     .channel_first(true)
///     .softmax(true)
///     .device("cuda:1")
///     .build();
/// assert_eq!(options.device, Some(Device::Cuda(1)));
/// ```
#[derive(Debug, Clone, Default, Builder)]
#[builder(derive(Clone, Debug))]
pub struct CallOptions {
    /// Channel order of the inputs (and of the model). Inferred when `None`.
    pub channel_first: Option<bool>,
    /// Produces attributions when they are missing or must be regenerated.
    pub explainer: Option<Explainer>,
    /// Overrides the metric's softmax default.
    pub softmax: Option<bool>,
    /// Device for every model and explainer invocation of the call.
    #[builder(into)]
    pub device: Option<Device>,
    /// Forwarded to the model backend.
    #[builder(default)]
    pub predict: PredictOptions,
}

// =============================================================================
// CallContext
// =============================================================================

/// Everything a metric hook may use during one call.
#[derive(Debug)]
pub struct CallContext<'m> {
    model: ModelAdapter<'m>,
    explainer: Option<Explainer>,
    channel_first: bool,
    softmax: bool,
}

impl<'m> CallContext<'m> {
    pub fn new(model: ModelAdapter<'m>, explainer: Option<Explainer>, softmax: bool) -> Self {
        let channel_first = model.channel_first();
        Self {
            model,
            explainer,
            channel_first,
            softmax,
        }
    }

    /// Wrapped model of this call.
    pub fn model(&self) -> &ModelAdapter<'m> {
        &self.model
    }

    pub fn explainer(&self) -> Option<&Explainer> {
        self.explainer.as_ref()
    }

    /// The explainer, or [`ConfigError::MissingExplainFn`].
    pub fn require_explainer(&self) -> Result<&Explainer, ConfigError> {
        self.explainer.as_ref().ok_or(ConfigError::MissingExplainFn)
    }

    /// Run the explainer on a channel-first batch.
    pub fn explain(
        &self,
        inputs: ArrayViewD<'_, f32>,
        targets: ArrayView1<'_, usize>,
    ) -> Result<ArrayD<f32>> {
        self.require_explainer()?.explain(&self.model, inputs, targets)
    }

    /// Channel order the inputs arrived in.
    pub fn channel_first(&self) -> bool {
        self.channel_first
    }

    pub fn softmax(&self) -> bool {
        self.softmax
    }

    pub fn device(&self) -> Option<&Device> {
        self.model.device()
    }
}

// =============================================================================
// History
// =============================================================================

/// Opt-in record of per-call results.
///
/// Only successful calls are recorded.
#[derive(Debug, Clone, Serialize)]
pub struct History<R> {
    calls: Vec<Vec<R>>,
}

impl<R> Default for History<R> {
    fn default() -> Self {
        Self { calls: Vec::new() }
    }
}

impl<R> History<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the results of one call.
    pub fn record(&mut self, results: Vec<R>) {
        self.calls.push(results);
    }

    /// Results of the most recent call. Empty before the first call.
    pub fn last_results(&self) -> &[R] {
        self.calls.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Results of every recorded call, oldest first.
    pub fn all_results(&self) -> &[Vec<R>] {
        &self.calls
    }

    /// Number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

// =============================================================================
// Evaluator
// =============================================================================

/// Runs a metric over a batch.
///
/// # Example
///
/// ```ignore
/// let metric = Continuity::new(ContinuityConfig::builder().patch_size(2).build()?);
/// let results = Evaluator::new(&metric).evaluate(&model, batch, &options)?;
/// let scores = metric.aggregated_score(&results);
/// ```
pub struct Evaluator<'a, M: Metric> {
    metric: &'a M,
}

impl<'a, M: Metric> Evaluator<'a, M> {
    pub fn new(metric: &'a M) -> Self {
        Self { metric }
    }

    /// Evaluate every instance of `batch` and return the results in batch order.
    ///
    /// # Errors
    ///
    /// - [`ConfigError`] when attributions are missing and no explainer or
    ///   no labels were given, or when the metric rejects its configuration
    ///   against the inputs
    /// - [`ShapeError`](crate::ShapeError) when inputs, labels and
    ///   attributions do not fit together
    /// - any error raised by the model, the explainer or the metric itself
    pub fn evaluate(
        &self,
        model: &dyn Model,
        batch: Batch,
        options: &CallOptions,
    ) -> Result<Vec<M::Output>> {
        let metric = self.metric;
        let base = metric.base();
        let Batch { x, y, a, s } = batch;
        debug!(metric = metric.name(), shape = ?x.shape(), "evaluation started");

        // Canonical layout
        let channel_first = match options.channel_first {
            Some(cf) => cf,
            None => infer_channel_first(x.shape())?,
        };
        let x = make_channel_first(x, channel_first)?;
        metric.validate_input(x.shape())?;

        let softmax = options.softmax.unwrap_or(base.softmax);
        let adapter = ModelAdapter::new(
            model,
            channel_first,
            softmax,
            options.device.clone(),
            options.predict.clone(),
        );
        let ctx = CallContext::new(adapter, options.explainer.clone(), softmax);

        // Attributions
        let a = match a {
            Some(a) => a,
            None => {
                ctx.require_explainer()?;
                let y = y.as_ref().ok_or(ConfigError::MissingLabels)?;
                debug!(metric = metric.name(), "generating attributions");
                ctx.explain(x.view(), y.view())?
            }
        };
        let a = expand_attribution_channel(a, x.shape())?;
        check_attributions(x.shape(), a.shape())?;
        if !base.disable_warnings && is_constant(a.view()) {
            warn!(
                metric = metric.name(),
                "all attribution values are equal; scores may be uninformative"
            );
        }

        let mut batch = PreparedBatch::new(x, y, a, s)?;
        let state = metric.custom_preprocess(&ctx, &batch)?;
        base.process_batch(&mut batch.a)?;

        let n = batch.len();
        let pb = progress_bar(n, base.display_progressbar, metric.name());
        let results = base.parallelism.maybe_par_try_map(0..n, |i| {
            let out = metric.evaluate_instance(&ctx, &state, batch.instance(i));
            pb.inc(1);
            out
        })?;
        pb.finish_and_clear();

        metric.custom_postprocess(&ctx, &state, &results)?;
        debug!(metric = metric.name(), n_instances = n, "evaluation finished");
        Ok(results)
    }

    /// [`evaluate`](Self::evaluate) and record the results in `history`.
    ///
    /// A failed call leaves `history` untouched.
    pub fn evaluate_into<'h>(
        &self,
        model: &dyn Model,
        batch: Batch,
        options: &CallOptions,
        history: &'h mut History<M::Output>,
    ) -> Result<&'h [M::Output]> {
        let results = self.evaluate(model, batch, options)?;
        history.record(results);
        Ok(history.last_results())
    }
}

fn progress_bar(len: usize, visible: bool, name: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Evaluating {}", name));
    pb
}
