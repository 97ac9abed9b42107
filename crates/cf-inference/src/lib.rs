//! # cf-inference
//!
//! Causal identification and refutation for counterfact.
//!
//! This crate provides:
//! - Causal graphs over an adjacency matrix, with the operations the ID
//!   algorithm needs (ancestors, interventions, c-components)
//! - The ID algorithm for deciding identifiability and producing estimand
//!   formulas
//! - Linear effect estimators (OLS, two-stage least squares)
//! - A Monte-Carlo refutation framework with five refuters
//!
//! ## Architecture
//!
//! Refuters depend only on the `EstimatorFactory` trait from cf-core, not on
//! the concrete estimators here, so callers can plug in their own.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Linear effect estimators and the default factory.
pub mod estimator;
/// Causal graphs and the structural operations on them.
pub mod graph;
/// The ID algorithm for effect identification.
pub mod ident;
/// The refutation framework and its five refuters.
pub mod refute;
/// Small learners for the dummy-outcome transformation pipeline.
pub mod regressors;

pub use estimator::{
    InstrumentalVariableEstimator, LinearEstimatorFactory, LinearRegressionEstimator,
};
pub use graph::CausalGraph;
pub use ident::{ConditionalFactor, IdExpression, IdIdentifier, IdTerm, IdentifyResult};
pub use refute::{
    BootstrapRefuter, BootstrapRefuterConfig, CausalRefuter, DataSubsetRefuter,
    DataSubsetRefuterConfig, DummyOutcomeRefuter, DummyOutcomeRefuterConfig, PlaceboKind,
    PlaceboTreatmentRefuter, PlaceboTreatmentRefuterConfig, RandomCommonCauseRefuter,
    RandomCommonCauseRefuterConfig, RefutationContext, SignificanceConfig, SignificanceMethod,
    Transformation, VariableSelection, test_significance,
};
pub use regressors::{Regressor, RegressorKind};
