//! Bootstrap refuter: re-estimate on resampled data with noisy covariates.

use cf_core::{CausalRefutation, Column, Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::{
    run_simulations, CausalRefuter, RefutationContext, SignificanceConfig, VariableSelection,
    DEFAULT_NUM_SIMULATIONS,
};

/// Settings for [`BootstrapRefuter`].
#[derive(Debug, Clone)]
pub struct BootstrapRefuterConfig {
    /// Number of bootstrap datasets to draw.
    pub num_simulations: usize,
    /// Rows per bootstrap sample; defaults to the dataset size.
    pub sample_size: Option<usize>,
    /// Which variables of interest receive measurement noise.
    pub required_variables: VariableSelection,
    /// Noise standard deviation for continuous variables.
    pub noise: f64,
    /// Flip probability for boolean variables; defaults to `noise` when that
    /// is a valid probability.
    pub probability_of_change: Option<f64>,
    /// Worker threads; 1 runs sequentially.
    pub n_jobs: usize,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    /// Significance-test settings.
    pub significance: SignificanceConfig,
}

impl Default for BootstrapRefuterConfig {
    fn default() -> Self {
        Self {
            num_simulations: DEFAULT_NUM_SIMULATIONS,
            sample_size: None,
            required_variables: VariableSelection::All,
            noise: 0.1,
            probability_of_change: None,
            n_jobs: 1,
            seed: None,
            significance: SignificanceConfig::default(),
        }
    }
}

/// Refutes an estimate by bootstrap-resampling rows and adding measurement
/// noise to the chosen covariates. A sound estimate should be stable under
/// resampling, so its simulated distribution should cover the original value.
pub struct BootstrapRefuter<'a> {
    ctx: RefutationContext<'a>,
    config: BootstrapRefuterConfig,
    chosen_variables: Vec<String>,
    flip_probability: f64,
}

impl<'a> BootstrapRefuter<'a> {
    /// Validate the configuration against the context.
    pub fn new(ctx: RefutationContext<'a>, config: BootstrapRefuterConfig) -> Result<Self> {
        let candidates = ctx.target_estimand.variables_of_interest();
        let chosen_variables = config.required_variables.choose(&candidates, config.seed)?;
        for name in &chosen_variables {
            if !ctx.data.has_column(name) {
                return Err(Error::Validation(format!(
                    "variable '{name}' is not a column of the dataset"
                )));
            }
        }
        let flip_probability = match config.probability_of_change {
            Some(p) if (0.0..=1.0).contains(&p) => p,
            Some(p) => {
                return Err(Error::Validation(format!(
                    "probability_of_change must be in [0, 1], got {p}"
                )))
            }
            None if config.noise <= 1.0 => config.noise,
            None => {
                return Err(Error::Validation(
                    "noise exceeds 1; set probability_of_change explicitly for boolean variables"
                        .into(),
                ))
            }
        };
        if let Some(size) = config.sample_size {
            if size == 0 {
                return Err(Error::Validation("sample_size must be at least 1".into()));
            }
            if size > ctx.data.n_rows() {
                log::warn!(
                    "bootstrap sample size {size} exceeds the dataset size {}",
                    ctx.data.n_rows()
                );
            }
        }
        Ok(Self { ctx, config, chosen_variables, flip_probability })
    }

    /// Add measurement noise to one column. Numeric noise scales with the
    /// column's spread; booleans flip and categoricals redraw with the flip
    /// probability.
    fn perturb(&self, column: &Column, rng: &mut StdRng) -> Result<Column> {
        let scale = self.config.noise * column.std();
        let noise = Normal::new(0.0, scale)
            .map_err(|e| Error::Computation(format!("noise distribution: {e}")))?;
        Ok(match column {
            Column::Float(v) => {
                Column::Float(v.iter().map(|x| x + noise.sample(rng)).collect())
            }
            Column::Int(v) => Column::Int(
                v.iter().map(|x| x + noise.sample(rng).round() as i64).collect(),
            ),
            Column::Bool(v) => Column::Bool(
                v.iter()
                    .map(|&b| {
                        if rng.random::<f64>() < self.flip_probability {
                            !b
                        } else {
                            b
                        }
                    })
                    .collect(),
            ),
            Column::Categorical(v) => {
                let categories = column.categories()?;
                Column::Categorical(
                    v.iter()
                        .map(|label| {
                            if categories.len() > 1
                                && rng.random::<f64>() < self.flip_probability
                            {
                                // Redraw uniformly among the other labels.
                                let others: Vec<&String> =
                                    categories.iter().filter(|c| *c != label).collect();
                                others[rng.random_range(0..others.len())].clone()
                            } else {
                                label.clone()
                            }
                        })
                        .collect(),
                )
            }
        })
    }
}

impl CausalRefuter for BootstrapRefuter<'_> {
    fn refute_estimate(&self) -> Result<Vec<CausalRefutation>> {
        let n = self.ctx.data.n_rows();
        let sample_size = self.config.sample_size.unwrap_or(n);
        let simulations =
            run_simulations(self.config.num_simulations, self.config.n_jobs, |i| {
                let mut rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_rng(&mut rand::rng()),
                };
                let indices: Vec<usize> =
                    (0..sample_size).map(|_| rng.random_range(0..n)).collect();
                let mut sample = self.ctx.data.take(&indices)?;
                for name in &self.chosen_variables {
                    let perturbed = self.perturb(sample.column(name)?, &mut rng)?;
                    sample = sample.assign(name.clone(), perturbed)?;
                }
                let estimator =
                    self.ctx.factory.build(&sample, self.ctx.target_estimand, self.ctx.estimate)?;
                Ok(estimator.estimate_effect()?.value)
            })?;

        let new_effect = simulations.iter().sum::<f64>() / simulations.len() as f64;
        let mut refutation = CausalRefutation::new(
            self.ctx.estimate.value,
            new_effect,
            "Refute: Bootstrap Sample Dataset",
        );
        refutation.add_significance_test_results(super::test_significance(
            &self.config.significance,
            &simulations,
            self.ctx.estimate.value,
        )?);
        Ok(vec![refutation])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::LinearEstimatorFactory;
    use cf_core::{CausalEstimate, Dataset, EstimatorFactory, IdentifiedEstimand};

    fn linear_world(n: usize, seed: u64) -> (Dataset, IdentifiedEstimand, CausalEstimate) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.2).unwrap();
        let mut w = Vec::new();
        let mut t = Vec::new();
        let mut y = Vec::new();
        for _ in 0..n {
            let wi: f64 = rng.random::<f64>() * 2.0 - 1.0;
            let ti = wi + noise.sample(&mut rng);
            let yi = 5.0 * ti + wi + noise.sample(&mut rng);
            w.push(wi);
            t.push(ti);
            y.push(yi);
        }
        let data = Dataset::new(vec![
            ("W0".into(), Column::Float(w)),
            ("v0".into(), Column::Float(t)),
            ("y".into(), Column::Float(y)),
        ])
        .unwrap();
        let estimand = IdentifiedEstimand::backdoor("v0", "y", vec!["W0".into()]);
        let factory = LinearEstimatorFactory;
        let estimate = factory
            .build(&data, &estimand, &CausalEstimate::new(0.0))
            .unwrap()
            .estimate_effect()
            .unwrap();
        (data, estimand, estimate)
    }

    #[test]
    fn stable_estimate_survives_bootstrap() {
        let (data, estimand, estimate) = linear_world(400, 21);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let refuter = BootstrapRefuter::new(
            ctx,
            BootstrapRefuterConfig { seed: Some(17), ..Default::default() },
        )
        .unwrap();
        let results = refuter.refute_estimate().unwrap();
        assert_eq!(results.len(), 1);
        let refutation = &results[0];
        assert!((refutation.new_effect - refutation.estimated_effect).abs() < 0.2);
        let sig = refutation.significance.as_ref().unwrap();
        assert!(!sig.is_significant, "p={}", sig.p_value);
    }

    #[test]
    fn zero_noise_bootstrap_recovers_the_estimate() {
        let (data, estimand, estimate) = linear_world(400, 23);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let refuter = BootstrapRefuter::new(
            ctx,
            BootstrapRefuterConfig { noise: 0.0, seed: Some(19), ..Default::default() },
        )
        .unwrap();
        let results = refuter.refute_estimate().unwrap();
        // Pure resampling: the simulated mean tracks the original estimate.
        assert!(
            (results[0].new_effect - estimate.value).abs() < 0.05,
            "new={} vs {}",
            results[0].new_effect,
            estimate.value
        );
    }

    #[test]
    fn rejects_unknown_required_variable() {
        let (data, estimand, estimate) = linear_world(50, 2);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let config = BootstrapRefuterConfig {
            required_variables: VariableSelection::Select(vec!["nope".into()]),
            ..Default::default()
        };
        assert!(BootstrapRefuter::new(ctx, config).is_err());
    }

    #[test]
    fn rejects_invalid_flip_probability() {
        let (data, estimand, estimate) = linear_world(50, 2);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let config =
            BootstrapRefuterConfig { probability_of_change: Some(1.5), ..Default::default() };
        assert!(BootstrapRefuter::new(ctx, config).is_err());

        let config = BootstrapRefuterConfig { noise: 2.0, ..Default::default() };
        assert!(BootstrapRefuter::new(ctx, config).is_err());
    }

    #[test]
    fn rejects_empty_sample_size() {
        let (data, estimand, estimate) = linear_world(50, 2);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let config = BootstrapRefuterConfig { sample_size: Some(0), ..Default::default() };
        let err = BootstrapRefuter::new(ctx, config).err().unwrap();
        assert!(err.to_string().contains("sample_size"));
    }
}
