//! Model adapter: a uniform predict/reshape interface over model backends.
//!
//! # Key Types
//!
//! - [`Model`]: a raw backend producing class scores
//! - [`FnModel`]: a backend defined by a closure
//! - [`Predictor`]: what metrics call (predict, shape input, unwrap, device)
//! - [`ModelAdapter`]: binds a backend to the settings of one metric call
//!
//! Metrics always hand channel-first batches to a [`Predictor`]; the adapter
//! converts to the backend's own channel order when it differs.

mod transform;

use std::sync::Arc;

use ndarray::{Array2, ArrayD, ArrayViewD, IxDyn};

use crate::data::{make_channel_first, make_channel_last};
use crate::error::{Result, ShapeError};

pub use transform::OutputTransform;

// =============================================================================
// Device / PredictOptions
// =============================================================================

/// Device a call's model and explainer invocations are bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// Accelerator by ordinal.
    Cuda(usize),
    /// Any other backend-specific device name.
    Other(String),
}

impl From<&str> for Device {
    fn from(s: &str) -> Self {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "cpu" => Self::Cpu,
            "cuda" | "gpu" => Self::Cuda(0),
            _ => match lower.strip_prefix("cuda:").map(str::parse::<usize>) {
                Some(Ok(ordinal)) => Self::Cuda(ordinal),
                _ => Self::Other(s.to_string()),
            },
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Options forwarded to every backend invocation of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictOptions {
    /// Device to run on. Set from the call's device when present.
    pub device: Option<Device>,
    /// Preferred inference batch size; backends may ignore it.
    pub batch_size: Option<usize>,
}

// =============================================================================
// Model
// =============================================================================

/// A model backend.
///
/// `forward` receives inputs in the backend's own channel order and returns
/// raw class scores of shape `(n_inputs, n_classes)`.
pub trait Model: Send + Sync {
    fn forward(&self, inputs: ArrayViewD<'_, f32>, options: &PredictOptions) -> Result<Array2<f32>>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "model"
    }
}

/// Type alias for a closure-backed forward pass.
pub type ForwardFn = Arc<dyn Fn(ArrayViewD<'_, f32>) -> Array2<f32> + Send + Sync + 'static>;

/// A model defined by a closure.
///
/// ```
/// use explain_eval::model::FnModel;
/// use ndarray::{Array2, Axis};
///
/// // Two-class model scoring the mean input value.
/// let model = FnModel::new("mean", |x| {
///     let n = x.len_of(Axis(0));
///     let mut out = Array2::zeros((n, 2));
///     for (i, inst) in x.axis_iter(Axis(0)).enumerate() {
///         let m = inst.mean().unwrap_or(0.0);
///         out[[i, 0]] = -m;
///         out[[i, 1]] = m;
///     }
///     out
/// });
/// ```
#[derive(Clone)]
pub struct FnModel {
    name: String,
    forward_fn: ForwardFn,
}

impl FnModel {
    pub fn new(
        name: impl Into<String>,
        forward_fn: impl Fn(ArrayViewD<'_, f32>) -> Array2<f32> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            forward_fn: Arc::new(forward_fn),
        }
    }
}

impl std::fmt::Debug for FnModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnModel").field("name", &self.name).finish()
    }
}

impl Model for FnModel {
    fn forward(&self, inputs: ArrayViewD<'_, f32>, _options: &PredictOptions) -> Result<Array2<f32>> {
        Ok((self.forward_fn)(inputs))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Predictor
// =============================================================================

/// Uniform model interface used by metrics and explainers.
pub trait Predictor: Send + Sync {
    /// Class scores for a channel-first batch, shape `(n_inputs, n_classes)`.
    fn predict(&self, inputs: ArrayViewD<'_, f32>) -> Result<Array2<f32>>;

    /// Reshape `x` into a batch of one with instance shape `shape`.
    ///
    /// `channel_first` tells the order of `shape`; the result is always
    /// channel-first.
    fn shape_input(
        &self,
        x: ArrayViewD<'_, f32>,
        shape: &[usize],
        channel_first: bool,
    ) -> Result<ArrayD<f32>>;

    /// The wrapped backend.
    fn get_model(&self) -> &dyn Model;

    /// Device bound for the current call.
    fn device(&self) -> Option<&Device>;
}

/// Binds a backend to the settings of one metric call.
pub struct ModelAdapter<'m> {
    model: &'m dyn Model,
    channel_first: bool,
    transform: OutputTransform,
    options: PredictOptions,
}

impl<'m> ModelAdapter<'m> {
    /// Wrap a backend.
    ///
    /// * `channel_first` - channel order the backend expects
    /// * `softmax` - whether predictions are softmax probabilities
    /// * `device` - overrides `options.device` when set
    pub fn new(
        model: &'m dyn Model,
        channel_first: bool,
        softmax: bool,
        device: Option<Device>,
        mut options: PredictOptions,
    ) -> Self {
        if device.is_some() {
            options.device = device;
        }
        Self {
            model,
            channel_first,
            transform: OutputTransform::from_softmax(softmax),
            options,
        }
    }

    /// Whether the backend takes channel-first inputs.
    pub fn channel_first(&self) -> bool {
        self.channel_first
    }

    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    pub fn options(&self) -> &PredictOptions {
        &self.options
    }
}

impl std::fmt::Debug for ModelAdapter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model", &self.model.name())
            .field("channel_first", &self.channel_first)
            .field("transform", &self.transform)
            .field("options", &self.options)
            .finish()
    }
}

impl Predictor for ModelAdapter<'_> {
    fn predict(&self, inputs: ArrayViewD<'_, f32>) -> Result<Array2<f32>> {
        let n = inputs.shape().first().copied().unwrap_or(0);
        let mut scores = if self.channel_first {
            self.model.forward(inputs, &self.options)?
        } else {
            let reordered = make_channel_last(inputs)?;
            self.model.forward(reordered.view(), &self.options)?
        };

        if scores.nrows() != n {
            return Err(ShapeError::PredictionRows {
                expected: n,
                got: scores.nrows(),
            }
            .into());
        }
        self.transform.transform_inplace(&mut scores);
        Ok(scores)
    }

    fn shape_input(
        &self,
        x: ArrayViewD<'_, f32>,
        shape: &[usize],
        channel_first: bool,
    ) -> Result<ArrayD<f32>> {
        let mut batched = Vec::with_capacity(shape.len() + 1);
        batched.push(1);
        batched.extend_from_slice(shape);

        let data: Vec<f32> = x.iter().copied().collect();
        let len = data.len();
        let arr = ArrayD::from_shape_vec(IxDyn(&batched), data)
            .map_err(|_| ShapeError::Reshape { len, shape: batched })?;
        Ok(make_channel_first(arr, channel_first)?)
    }

    fn get_model(&self) -> &dyn Model {
        self.model
    }

    fn device(&self) -> Option<&Device> {
        self.options.device.as_ref()
    }
}
