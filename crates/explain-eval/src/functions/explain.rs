//! Explanation functions.

use std::sync::Arc;

use ndarray::{ArrayD, ArrayView1, ArrayViewD};

use crate::error::Result;
use crate::model::Predictor;

/// Signature of an explanation function.
///
/// Receives the call's predictor, a channel-first input batch and one
/// target class per instance; returns attributions with the batch axis
/// first. The channel axis may be omitted.
pub type ExplainFn = Arc<
    dyn Fn(&dyn Predictor, ArrayViewD<'_, f32>, ArrayView1<'_, usize>) -> Result<ArrayD<f32>>
        + Send
        + Sync
        + 'static,
>;

/// A user-provided explanation method.
///
/// # Example
///
/// ```
/// use explain_eval::functions::Explainer;
///
/// // Input-times-one: the attribution is the input itself.
/// let explainer = Explainer::new("identity", |_model, x, _y| Ok(x.to_owned()));
/// assert_eq!(explainer.name(), "identity");
/// ```
#[derive(Clone)]
pub struct Explainer {
    name: &'static str,
    explain_fn: ExplainFn,
}

impl Explainer {
    /// Create a new explainer.
    ///
    /// * `name` - Name for logging
    /// * `explain_fn` - Function producing attributions
    pub fn new(
        name: &'static str,
        explain_fn: impl Fn(&dyn Predictor, ArrayViewD<'_, f32>, ArrayView1<'_, usize>) -> Result<ArrayD<f32>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            explain_fn: Arc::new(explain_fn),
        }
    }

    /// Produce attributions for `inputs` w.r.t. `targets`.
    pub fn explain(
        &self,
        model: &dyn Predictor,
        inputs: ArrayViewD<'_, f32>,
        targets: ArrayView1<'_, usize>,
    ) -> Result<ArrayD<f32>> {
        (self.explain_fn)(model, inputs, targets)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Explainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explainer").field("name", &self.name).finish()
    }
}
