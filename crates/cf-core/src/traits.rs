//! Estimator seam between identification/refutation and concrete fitters.
//!
//! Refuters depend on these traits, not on any concrete estimator: a refuter
//! rebuilds an estimator once per simulated dataset through the factory and
//! only ever asks it for an effect value.

use crate::table::Dataset;
use crate::types::{CausalEstimate, IdentifiedEstimand};
use crate::Result;

/// A fitted estimator bound to one dataset and estimand.
pub trait EffectEstimator {
    /// Compute the effect estimate.
    fn estimate_effect(&self) -> Result<CausalEstimate>;
}

/// Builds estimators bound to (possibly perturbed) inputs.
///
/// `reference` is the original estimate; factories may use it to reproduce
/// estimator settings when re-binding to a perturbed dataset.
pub trait EstimatorFactory: Send + Sync {
    /// Build a fitted estimator for `data` under `estimand`.
    fn build(
        &self,
        data: &Dataset,
        estimand: &IdentifiedEstimand,
        reference: &CausalEstimate,
    ) -> Result<Box<dyn EffectEstimator>>;
}
