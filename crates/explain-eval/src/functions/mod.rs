//! Pluggable collaborator functions.
//!
//! Each wrapper holds a named, shareable closure. Cloning is cheap (the
//! closure sits behind an `Arc`), and the built-in constructors cover the
//! defaults metrics are configured with.
//!
//! - [`Explainer`]: produces attributions for a batch
//! - [`Perturbation`]: perturbs a single instance
//! - [`Normaliser`]: normalises one attribution
//! - [`Similarity`]: compares two traces
//! - [`Aggregator`]: collapses per-instance scores

mod aggregate;
mod explain;
mod normalise;
mod perturb;
mod similarity;

pub use aggregate::{AggregateFn, Aggregator};
pub use explain::{ExplainFn, Explainer};
pub use normalise::{NormaliseFn, Normaliser};
pub use perturb::{Baseline, PerturbArgs, PerturbFn, Perturbation};
pub use similarity::{Similarity, SimilarityFn};
