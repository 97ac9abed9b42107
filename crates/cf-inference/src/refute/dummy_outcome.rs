//! Dummy-outcome refuter: replace the outcome with one the treatment cannot
//! cause.
//!
//! The outcome is rebuilt by a transformation pipeline. Pipelines containing
//! a learner fit `f(W)` on one treatment stratum at a time and apply it to
//! every row outside that stratum, so the synthetic outcome depends on the
//! common causes but not on the treatment. A known effect `h(t)` can be added
//! on top; the re-estimated effect should then match `h`, which is zero by
//! default.

use cf_core::{CausalRefutation, Column, Error, IdentifiedEstimand, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::{
    run_simulations, CausalRefuter, RefutationContext, SignificanceConfig,
    DEFAULT_NUM_SIMULATIONS,
};
use crate::regressors::RegressorKind;

/// Name of the synthetic outcome column.
const DUMMY_OUTCOME_COLUMN: &str = "dummy_outcome";

/// One step of the outcome-transformation pipeline. Steps run in order, each
/// consuming the previous step's outcome.
#[derive(Clone)]
pub enum Transformation {
    /// Reset the outcome to zero.
    Zero,
    /// Add independent gaussian noise.
    Noise {
        /// Noise standard deviation.
        std_dev: f64,
    },
    /// Shuffle a fraction of the outcome values among themselves.
    Permute {
        /// Fraction of rows involved, in (0, 1].
        fraction: f64,
    },
    /// Replace the outcome with a learned `f(W)` over the common causes,
    /// fitted on the current training stratum.
    Regressor(RegressorKind),
    /// Replace the outcome with an arbitrary function of its current values.
    Custom(fn(&[f64]) -> Vec<f64>),
}

impl std::fmt::Debug for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transformation::Zero => write!(f, "Zero"),
            Transformation::Noise { std_dev } => write!(f, "Noise {{ std_dev: {std_dev} }}"),
            Transformation::Permute { fraction } => {
                write!(f, "Permute {{ fraction: {fraction} }}")
            }
            Transformation::Regressor(kind) => write!(f, "Regressor({kind:?})"),
            Transformation::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Pipeline used when none is given, and for training strata too small to
/// fit a learner on.
fn default_transformations() -> Vec<Transformation> {
    vec![Transformation::Zero, Transformation::Noise { std_dev: 1.0 }]
}

fn null_effect(_treatment: f64) -> f64 {
    0.0
}

/// Settings for [`DummyOutcomeRefuter`].
#[derive(Debug, Clone)]
pub struct DummyOutcomeRefuterConfig {
    /// Outcome-transformation pipeline; defaults to zero-plus-unit-noise.
    pub transformations: Vec<Transformation>,
    /// Number of pipeline applications per stratum.
    pub num_simulations: usize,
    /// Bin width for numeric treatments, as a multiple of the treatment's
    /// standard deviation.
    pub bucket_size_scale_factor: f64,
    /// Training strata smaller than this fall back to the default pipeline.
    pub min_data_point_threshold: usize,
    /// Known effect `h(t)` added to the synthetic outcome; the re-estimated
    /// effect is compared against its mean. Defaults to zero.
    pub true_causal_effect: fn(f64) -> f64,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    /// Significance-test settings.
    pub significance: SignificanceConfig,
}

impl Default for DummyOutcomeRefuterConfig {
    fn default() -> Self {
        Self {
            transformations: default_transformations(),
            num_simulations: DEFAULT_NUM_SIMULATIONS,
            bucket_size_scale_factor: 0.5,
            min_data_point_threshold: 30,
            true_causal_effect: null_effect,
            seed: None,
            significance: SignificanceConfig::default(),
        }
    }
}

fn needs_learner(transformations: &[Transformation]) -> bool {
    transformations.iter().any(|t| matches!(t, Transformation::Regressor(_)))
}

/// Refutes an estimate by substituting an outcome the treatment cannot have
/// caused and checking that the re-estimated effect collapses to the known
/// effect (zero unless configured otherwise).
///
/// Returns one [`CausalRefutation`] per training stratum, or a single record
/// when the pipeline has no learner and needs no strata.
pub struct DummyOutcomeRefuter<'a> {
    ctx: RefutationContext<'a>,
    config: DummyOutcomeRefuterConfig,
    outcome_name: String,
    treatment_name: String,
    common_causes: Vec<String>,
}

impl<'a> DummyOutcomeRefuter<'a> {
    /// Validate the pipeline and variable roles against the context.
    pub fn new(ctx: RefutationContext<'a>, config: DummyOutcomeRefuterConfig) -> Result<Self> {
        if config.transformations.is_empty() {
            return Err(Error::Validation("transformation pipeline is empty".into()));
        }
        if config.bucket_size_scale_factor <= 0.0 {
            return Err(Error::Validation(format!(
                "bucket_size_scale_factor must be positive, got {}",
                config.bucket_size_scale_factor
            )));
        }
        for step in &config.transformations {
            match step {
                Transformation::Noise { std_dev } if *std_dev <= 0.0 => {
                    return Err(Error::Validation(format!(
                        "noise std_dev must be positive, got {std_dev}"
                    )))
                }
                Transformation::Permute { fraction }
                    if !(*fraction > 0.0 && *fraction <= 1.0) =>
                {
                    return Err(Error::Validation(format!(
                        "permute fraction must be in (0, 1], got {fraction}"
                    )))
                }
                _ => {}
            }
        }
        let outcome_name = match ctx.target_estimand.outcome_variable.as_slice() {
            [name] => name.clone(),
            other => {
                return Err(Error::Validation(format!(
                    "dummy-outcome refutation needs exactly one outcome, got {}",
                    other.len()
                )))
            }
        };
        let treatment_name = match ctx.target_estimand.treatment_variable.as_slice() {
            [name] => name.clone(),
            other => {
                return Err(Error::Validation(format!(
                    "dummy-outcome refutation needs exactly one treatment, got {}",
                    other.len()
                )))
            }
        };
        let common_causes = ctx.target_estimand.variables_of_interest();
        for name in common_causes.iter().chain([&outcome_name, &treatment_name]) {
            if !ctx.data.has_column(name) {
                return Err(Error::Validation(format!(
                    "variable '{name}' is not a column of the dataset"
                )));
            }
        }
        if needs_learner(&config.transformations) && common_causes.is_empty() {
            return Err(Error::Validation(
                "a learner transformation needs at least one common cause to fit on".into(),
            ));
        }
        Ok(Self { ctx, config, outcome_name, treatment_name, common_causes })
    }

    /// Group row indices by treatment value.
    ///
    /// Booleans and categoricals use their natural groups (categoricals in
    /// lexicographic order); numeric treatments are cut into equal-width bins
    /// of `bucket_size_scale_factor · std` starting at the minimum.
    fn strata(&self) -> Result<Vec<Vec<usize>>> {
        let column = self.ctx.data.column(&self.treatment_name)?;
        let groups: Vec<Vec<usize>> = match column {
            Column::Bool(v) => {
                let mut groups = vec![Vec::new(), Vec::new()];
                for (i, &b) in v.iter().enumerate() {
                    groups[usize::from(b)].push(i);
                }
                groups
            }
            Column::Categorical(v) => {
                let mut labels = column.categories()?;
                labels.sort();
                labels
                    .iter()
                    .map(|label| {
                        v.iter()
                            .enumerate()
                            .filter(|(_, value)| *value == label)
                            .map(|(i, _)| i)
                            .collect()
                    })
                    .collect()
            }
            Column::Float(_) | Column::Int(_) => {
                let values = column.as_numeric();
                let std = column.std();
                if std == 0.0 {
                    return Err(Error::Validation(format!(
                        "treatment '{}' is constant; cannot form strata",
                        self.treatment_name
                    )));
                }
                let width = self.config.bucket_size_scale_factor * std;
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let buckets = ((max - min) / width).floor() as usize + 1;
                let mut groups = vec![Vec::new(); buckets];
                for (i, &v) in values.iter().enumerate() {
                    let b = (((v - min) / width).floor() as usize).min(buckets - 1);
                    groups[b].push(i);
                }
                groups
            }
        };
        Ok(groups.into_iter().filter(|g| !g.is_empty()).collect())
    }

    fn feature_rows(&self, indices: &[usize]) -> Result<Vec<Vec<f64>>> {
        let columns = self.ctx.data.numeric_columns(&self.common_causes)?;
        Ok(indices
            .iter()
            .map(|&i| columns.iter().map(|c| c[i]).collect())
            .collect())
    }

    /// Run the pipeline over the validation outcome. When a training split is
    /// given, learners are fitted on it and the training outcome tracks the
    /// pipeline so later learners see the transformed targets.
    fn process(
        &self,
        transformations: &[Transformation],
        train: Option<(&[Vec<f64>], &mut Vec<f64>)>,
        validation_x: &[Vec<f64>],
        mut outcome: Vec<f64>,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>> {
        let (train_x, mut train_outcome) = match train {
            Some((x, y)) => (Some(x), Some(y)),
            None => (None, None),
        };
        for step in transformations {
            match step {
                Transformation::Zero => {
                    outcome.iter_mut().for_each(|v| *v = 0.0);
                    if let Some(train_y) = train_outcome.as_deref_mut() {
                        train_y.iter_mut().for_each(|v| *v = 0.0);
                    }
                }
                Transformation::Noise { std_dev } => {
                    let noise = Normal::new(0.0, *std_dev)
                        .map_err(|e| Error::Computation(format!("noise distribution: {e}")))?;
                    if let Some(train_y) = train_outcome.as_deref_mut() {
                        train_y.iter_mut().for_each(|v| *v += noise.sample(rng));
                    }
                    outcome.iter_mut().for_each(|v| *v += noise.sample(rng));
                }
                Transformation::Permute { fraction } => {
                    if let Some(train_y) = train_outcome.as_deref_mut() {
                        permute_fraction(train_y, *fraction, rng);
                    }
                    permute_fraction(&mut outcome, *fraction, rng);
                }
                Transformation::Regressor(kind) => {
                    let (x, y) = match (train_x, train_outcome.as_deref()) {
                        (Some(x), Some(y)) => (x, y),
                        _ => {
                            return Err(Error::Computation(
                                "learner transformation reached without a training stratum"
                                    .into(),
                            ))
                        }
                    };
                    let model = kind.fit(x, y, rng)?;
                    if let Some(train_y) = train_outcome.as_deref_mut() {
                        let refit = model.predict(x);
                        train_y.copy_from_slice(&refit);
                    }
                    outcome = model.predict(validation_x);
                }
                Transformation::Custom(f) => {
                    if let Some(train_y) = train_outcome.as_deref_mut() {
                        *train_y = f(train_y.as_slice());
                    }
                    outcome = f(&outcome);
                }
            }
        }
        Ok(outcome)
    }

    fn refute_stratum(
        &self,
        estimand: &IdentifiedEstimand,
        transformations: &[Transformation],
        training: Option<&[usize]>,
        validation: &[usize],
    ) -> Result<CausalRefutation> {
        let outcome_all = self.ctx.data.numeric_column(&self.outcome_name)?;
        let treatment_all = self.ctx.data.numeric_column(&self.treatment_name)?;
        let validation_x = self.feature_rows(validation)?;
        let base_outcome: Vec<f64> = validation.iter().map(|&i| outcome_all[i]).collect();
        let known_effect: Vec<f64> = validation
            .iter()
            .map(|&i| (self.config.true_causal_effect)(treatment_all[i]))
            .collect();
        let reference =
            known_effect.iter().sum::<f64>() / known_effect.len().max(1) as f64;
        let validation_data = self.ctx.data.take(validation)?;
        let train_x = match training {
            Some(indices) => Some((self.feature_rows(indices)?, indices)),
            None => None,
        };

        let simulations = run_simulations(self.config.num_simulations, 1, |i| {
            let mut rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            let mut train_outcome;
            let train = match &train_x {
                Some((x, indices)) => {
                    train_outcome = indices.iter().map(|&j| outcome_all[j]).collect();
                    Some((x.as_slice(), &mut train_outcome))
                }
                None => None,
            };
            let mut synthetic =
                self.process(transformations, train, &validation_x, base_outcome.clone(), &mut rng)?;
            for (value, h) in synthetic.iter_mut().zip(&known_effect) {
                *value += h;
            }
            let sample = validation_data.assign(DUMMY_OUTCOME_COLUMN, Column::Float(synthetic))?;
            let estimator = self.ctx.factory.build(&sample, estimand, self.ctx.estimate)?;
            Ok(estimator.estimate_effect()?.value)
        })?;

        let new_effect = simulations.iter().sum::<f64>() / simulations.len() as f64;
        let mut refutation =
            CausalRefutation::new(reference, new_effect, "Refute: Use a Dummy Outcome");
        refutation.add_significance_test_results(super::test_significance(
            &self.config.significance,
            &simulations,
            reference,
        )?);
        Ok(refutation)
    }
}

fn permute_fraction(values: &mut [f64], fraction: f64, rng: &mut StdRng) {
    if fraction >= 1.0 {
        values.shuffle(rng);
        return;
    }
    let count = ((values.len() as f64) * fraction).floor() as usize;
    let mut picked = rand::seq::index::sample(rng, values.len(), count.max(1)).into_vec();
    let mut shuffled: Vec<f64> = picked.iter().map(|&i| values[i]).collect();
    shuffled.shuffle(rng);
    picked.sort_unstable();
    for (&i, v) in picked.iter().zip(shuffled) {
        values[i] = v;
    }
}

impl CausalRefuter for DummyOutcomeRefuter<'_> {
    fn refute_estimate(&self) -> Result<Vec<CausalRefutation>> {
        let n = self.ctx.data.n_rows();
        let mut estimand = self.ctx.target_estimand.clone();
        estimand.outcome_variable = vec![DUMMY_OUTCOME_COLUMN.to_string()];

        if !needs_learner(&self.config.transformations) {
            // No learner means no train/apply split: the pipeline rewrites
            // the whole outcome column in one pass.
            let all: Vec<usize> = (0..n).collect();
            return Ok(vec![self.refute_stratum(
                &estimand,
                &self.config.transformations,
                None,
                &all,
            )?]);
        }

        let fallback = default_transformations();
        let mut results = Vec::new();
        for stratum in self.strata()? {
            let validation: Vec<usize> = (0..n).filter(|i| !stratum.contains(i)).collect();
            if validation.is_empty() {
                log::warn!("skipping a treatment stratum that covers the whole dataset");
                continue;
            }
            // Too little training data for a learner: keep the stratum but
            // substitute the learner-free default pipeline.
            let (transformations, training) =
                if stratum.len() <= self.config.min_data_point_threshold {
                    log::warn!(
                        "training stratum has {} rows (threshold {}); using the default pipeline",
                        stratum.len(),
                        self.config.min_data_point_threshold
                    );
                    (fallback.as_slice(), None)
                } else {
                    (self.config.transformations.as_slice(), Some(stratum.as_slice()))
                };
            results.push(self.refute_stratum(&estimand, transformations, training, &validation)?);
        }
        if results.is_empty() {
            return Err(Error::Validation(
                "treatment stratification produced no usable strata".into(),
            ));
        }
        Ok(results)
    }
}
