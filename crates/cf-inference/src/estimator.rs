//! Linear effect estimators.
//!
//! Two closed-form estimators cover the identification strategies the
//! refuters exercise: ordinary least squares over a backdoor adjustment set,
//! and two-stage least squares for instrumental-variable estimands. Both are
//! fitted eagerly at construction so `estimate_effect` is a cheap read.

use cf_core::{
    CausalEstimate, Dataset, EffectEstimator, Error, EstimatorFactory, IdentifiedEstimand, Result,
};
use nalgebra::{DMatrix, DVector};

/// Least-squares solve via SVD.
///
/// Rank-deficient designs resolve to the minimum-norm solution, so a
/// degenerate regressor (e.g. a constant treatment column in a refuter's
/// validation split) yields a finite coefficient instead of an error.
fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>> {
    x.clone()
        .svd(true, true)
        .solve(y, 1e-10)
        .map_err(|e| Error::Computation(format!("least squares failed: {e}")))
}

/// Assemble a design matrix with an intercept column followed by the named
/// regressors, in order.
fn design_matrix(data: &Dataset, regressors: &[String]) -> Result<DMatrix<f64>> {
    let n = data.n_rows();
    let mut x = DMatrix::zeros(n, regressors.len() + 1);
    for i in 0..n {
        x[(i, 0)] = 1.0;
    }
    for (j, name) in regressors.iter().enumerate() {
        let col = data.numeric_column(name)?;
        for (i, &v) in col.iter().enumerate() {
            x[(i, j + 1)] = v;
        }
    }
    Ok(x)
}

fn single_name(role: &str, names: &[String]) -> Result<String> {
    match names {
        [name] => Ok(name.clone()),
        _ => Err(Error::Validation(format!(
            "linear estimators require exactly one {role} variable, got {}",
            names.len()
        ))),
    }
}

/// OLS of the outcome on the treatment plus the backdoor adjustment set.
///
/// The causal effect is the fitted treatment coefficient.
#[derive(Debug, Clone)]
pub struct LinearRegressionEstimator {
    effect: f64,
}

impl LinearRegressionEstimator {
    /// Fit the regression `outcome ~ 1 + treatment + controls`.
    pub fn fit(
        data: &Dataset,
        treatment: &str,
        outcome: &str,
        controls: &[String],
    ) -> Result<Self> {
        let mut regressors = vec![treatment.to_string()];
        regressors.extend(controls.iter().cloned());
        let x = design_matrix(data, &regressors)?;
        let y = DVector::from_vec(data.numeric_column(outcome)?);
        let beta = least_squares(&x, &y)?;
        Ok(Self { effect: beta[1] })
    }
}

impl EffectEstimator for LinearRegressionEstimator {
    fn estimate_effect(&self) -> Result<CausalEstimate> {
        Ok(CausalEstimate::new(self.effect))
    }
}

/// Two-stage least squares for instrumental-variable estimands.
///
/// Stage one regresses the treatment on the instruments; stage two regresses
/// the outcome on the stage-one fitted values. The causal effect is the
/// stage-two slope on the fitted treatment.
#[derive(Debug, Clone)]
pub struct InstrumentalVariableEstimator {
    effect: f64,
}

impl InstrumentalVariableEstimator {
    /// Fit 2SLS with the given instruments.
    pub fn fit(
        data: &Dataset,
        treatment: &str,
        outcome: &str,
        instruments: &[String],
    ) -> Result<Self> {
        if instruments.is_empty() {
            return Err(Error::Validation(
                "instrumental-variable estimation requires at least one instrument".into(),
            ));
        }
        let z = design_matrix(data, instruments)?;
        let t = DVector::from_vec(data.numeric_column(treatment)?);
        let first_stage = least_squares(&z, &t)?;
        let fitted_treatment = z * first_stage;

        let n = data.n_rows();
        let mut x = DMatrix::zeros(n, 2);
        for i in 0..n {
            x[(i, 0)] = 1.0;
            x[(i, 1)] = fitted_treatment[i];
        }
        let y = DVector::from_vec(data.numeric_column(outcome)?);
        let beta = least_squares(&x, &y)?;
        Ok(Self { effect: beta[1] })
    }
}

impl EffectEstimator for InstrumentalVariableEstimator {
    fn estimate_effect(&self) -> Result<CausalEstimate> {
        Ok(CausalEstimate::new(self.effect))
    }
}

/// Factory that picks the linear estimator matching the estimand's
/// identification method: 2SLS for `"iv"`-prefixed methods, OLS otherwise.
///
/// Variable names are read from the estimand at build time, so refuters that
/// rewrite names (placebo treatments, dummy outcomes) get the rewritten
/// columns without any estimator-specific plumbing.
#[derive(Debug, Clone, Default)]
pub struct LinearEstimatorFactory;

impl EstimatorFactory for LinearEstimatorFactory {
    fn build(
        &self,
        data: &Dataset,
        estimand: &IdentifiedEstimand,
        _reference: &CausalEstimate,
    ) -> Result<Box<dyn EffectEstimator>> {
        let treatment = single_name("treatment", &estimand.treatment_variable)?;
        let outcome = single_name("outcome", &estimand.outcome_variable)?;
        if estimand.is_iv() {
            Ok(Box::new(InstrumentalVariableEstimator::fit(
                data,
                &treatment,
                &outcome,
                &estimand.instrumental_variables,
            )?))
        } else {
            Ok(Box::new(LinearRegressionEstimator::fit(
                data,
                &treatment,
                &outcome,
                &estimand.backdoor_variables,
            )?))
        }
    }
}
