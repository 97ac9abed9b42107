//! # cf-core
//!
//! Core types for the counterfact causal-inference library.
//!
//! This crate holds the shared data model (datasets, estimands, estimates,
//! refutation records, ordered node sets) and the estimator traits the
//! inference crate programs against. It deliberately contains no algorithms:
//! identification and refutation live in `cf-inference`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
/// Insertion-ordered node sets for graph identification.
pub mod set;
/// Column-typed observational datasets.
pub mod table;
/// Estimator factory/estimator traits.
pub mod traits;
/// Shared value types: estimates, estimands, refutations.
pub mod types;

pub use error::{Error, Result};
pub use set::OrderedSet;
pub use table::{Column, Dataset};
pub use traits::{EffectEstimator, EstimatorFactory};
pub use types::{CausalEstimate, CausalRefutation, IdentifiedEstimand, SignificanceResult};
