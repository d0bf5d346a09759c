//! Evaluation life-cycle tests with a minimal custom metric.
//!
//! These tests verify that:
//! 1. Hooks run in order and see the documented inputs
//! 2. Attributions are generated, expanded, normalised and checked
//! 3. Layout, labels and segmentations reach each instance correctly

use std::sync::Mutex;

use approx::assert_relative_eq;
use explain_eval::data::{Instance, PreparedBatch};
use explain_eval::metrics::{BaseParams, CallContext, CallOptions, Evaluator, Metric, MetricKind};
use explain_eval::testing::{constant_explainer, input_explainer, sum_model};
use explain_eval::error::Result;
use explain_eval::{Batch, ConfigError, MetricError, Normaliser, Parallelism, Predictor, ShapeError};
use ndarray::{array, ArrayD, IxDyn};
use rstest::rstest;

// =============================================================================
// Test Metric
// =============================================================================

/// Sums each instance's attribution and records what the hooks saw.
struct AttributionMass {
    base: BaseParams,
    log: Mutex<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
struct Mass {
    index: usize,
    label: Option<usize>,
    total: f32,
    has_mask: bool,
    prediction: f32,
}

impl AttributionMass {
    fn new(base: BaseParams) -> Self {
        Self {
            base,
            log: Mutex::new(Vec::new()),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Metric for AttributionMass {
    type Output = Mass;
    type State = usize;

    fn kind(&self) -> MetricKind {
        MetricKind::Continuity
    }

    fn name(&self) -> &'static str {
        "AttributionMass"
    }

    fn base(&self) -> &BaseParams {
        &self.base
    }

    fn validate_input(&self, x_shape: &[usize]) -> Result<()> {
        self.log.lock().unwrap().push(format!("validate {:?}", x_shape));
        Ok(())
    }

    fn custom_preprocess(&self, _ctx: &CallContext<'_>, batch: &PreparedBatch) -> Result<usize> {
        // runs before normalisation
        self.log
            .lock()
            .unwrap()
            .push(format!("preprocess {}", batch.a.sum()));
        Ok(batch.len())
    }

    fn evaluate_instance(
        &self,
        ctx: &CallContext<'_>,
        state: &usize,
        instance: Instance<'_>,
    ) -> Result<Mass> {
        assert!(instance.index < *state);
        let batched = instance.x.to_owned().insert_axis(ndarray::Axis(0));
        let prediction = ctx.model().predict(batched.view())?[[0, 0]];
        Ok(Mass {
            index: instance.index,
            label: instance.y,
            total: instance.a.sum(),
            has_mask: instance.s.is_some(),
            prediction,
        })
    }

    fn custom_postprocess(
        &self,
        _ctx: &CallContext<'_>,
        _state: &usize,
        results: &[Mass],
    ) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("postprocess {}", results.len()));
        Ok(())
    }
}

fn plain() -> BaseParams {
    BaseParams {
        normalise: false,
        disable_warnings: true,
        ..Default::default()
    }
}

fn ramp(shape: &[usize]) -> ArrayD<f32> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (0..n).map(|v| v as f32).collect()).unwrap()
}

// =============================================================================
// Life-cycle
// =============================================================================

#[test]
fn hooks_run_in_order() {
    let metric = AttributionMass::new(plain());
    let batch = Batch::new(ramp(&[2, 1, 2, 2]))
        .with_labels(array![0, 0])
        .with_attributions(ArrayD::ones(IxDyn(&[2, 1, 2, 2])));

    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        metric.log(),
        vec!["validate [2, 1, 2, 2]", "preprocess 8", "postprocess 2"]
    );
}

#[test]
fn attributions_are_normalised_after_preprocess() {
    let base = BaseParams {
        normalise: true,
        normaliser: Normaliser::by_max(),
        abs: true,
        disable_warnings: true,
        ..Default::default()
    };
    let metric = AttributionMass::new(base);
    let a = array![[[[-4.0f32, 2.0], [0.0, 0.0]]], [[[1.0, 1.0], [1.0, 1.0]]]].into_dyn();
    let batch = Batch::new(ramp(&[2, 1, 2, 2]))
        .with_labels(array![0, 0])
        .with_attributions(a);

    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap();
    assert_eq!(metric.log()[1], "preprocess 2");
    assert_relative_eq!(results[0].total, 1.5);
    assert_relative_eq!(results[1].total, 4.0);
}

#[test]
fn missing_channel_axis_is_inserted() {
    let metric = AttributionMass::new(plain());
    let batch = Batch::new(ramp(&[1, 3, 4, 4]))
        .with_labels(array![0])
        .with_attributions(ArrayD::ones(IxDyn(&[1, 4, 4])));

    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap();
    assert_relative_eq!(results[0].total, 16.0);
}

#[test]
fn explainer_fills_in_missing_attributions() {
    let metric = AttributionMass::new(plain());
    let batch = Batch::new(ramp(&[1, 1, 2, 2])).with_labels(array![0]);
    let options = CallOptions::builder().explainer(input_explainer()).build();

    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &options)
        .unwrap();
    assert_relative_eq!(results[0].total, 6.0);
    assert_relative_eq!(results[0].prediction, 6.0);
}

#[test]
fn segmentations_reach_instances() {
    let metric = AttributionMass::new(plain());
    let batch = Batch::new(ramp(&[2, 1, 2, 2]))
        .with_labels(array![4, 7])
        .with_attributions(ArrayD::ones(IxDyn(&[2, 1, 2, 2])))
        .with_segmentations(ArrayD::zeros(IxDyn(&[2, 1, 2, 2])));

    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap();
    assert!(results.iter().all(|r| r.has_mask));
    assert_eq!(results[0].label, Some(4));
    assert_eq!(results[1].label, Some(7));

    let batch = Batch::new(ramp(&[1, 1, 2, 2])).with_attributions(ArrayD::ones(IxDyn(&[1, 1, 2, 2])));
    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap();
    assert!(!results[0].has_mask);
    assert_eq!(results[0].label, None);
}

#[rstest]
#[case(Parallelism::Sequential)]
#[case(Parallelism::Parallel)]
fn results_follow_batch_order(#[case] parallelism: Parallelism) {
    let metric = AttributionMass::new(BaseParams {
        parallelism,
        ..plain()
    });
    let x = ArrayD::from_shape_fn(IxDyn(&[16, 1, 2, 2]), |ix| ix[0] as f32);
    let batch = Batch::new(x).with_attributions(ArrayD::ones(IxDyn(&[16, 1, 2, 2])));

    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap();
    for (i, r) in results.iter().enumerate() {
        assert_eq!(r.index, i);
        assert_relative_eq!(r.prediction, 4.0 * i as f32);
    }
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn missing_labels_for_explanation() {
    let metric = AttributionMass::new(plain());
    let batch = Batch::new(ramp(&[1, 1, 2, 2]));
    let options = CallOptions::builder().explainer(constant_explainer(1.0)).build();
    let err = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &options)
        .unwrap_err();
    assert!(matches!(err, MetricError::Config(ConfigError::MissingLabels)));
}

#[test]
fn mismatched_attributions_are_rejected() {
    let metric = AttributionMass::new(plain());
    let batch = Batch::new(ramp(&[1, 1, 4, 4])).with_attributions(ArrayD::ones(IxDyn(&[1, 1, 3, 3])));
    let err = Evaluator::new(&metric)
        .evaluate(&sum_model(), batch, &CallOptions::default())
        .unwrap_err();
    assert!(matches!(err, MetricError::Shape(ShapeError::Spatial { .. })));
}

#[test]
fn ambiguous_layout_needs_explicit_channel_order() {
    let metric = AttributionMass::new(plain());
    let x = ArrayD::<f32>::zeros(IxDyn(&[1, 4, 4, 4]));
    let a = ArrayD::<f32>::ones(IxDyn(&[1, 4, 4, 4]));

    let err = Evaluator::new(&metric)
        .evaluate(
            &sum_model(),
            Batch::new(x.clone()).with_attributions(a.clone()),
            &CallOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, MetricError::Shape(ShapeError::AmbiguousLayout(_))));

    let options = CallOptions::builder().channel_first(true).build();
    let results = Evaluator::new(&metric)
        .evaluate(&sum_model(), Batch::new(x).with_attributions(a), &options)
        .unwrap();
    assert_relative_eq!(results[0].total, 64.0);
}
