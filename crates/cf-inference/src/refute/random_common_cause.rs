//! Random-common-cause refuter: add an independent covariate and re-adjust.

use cf_core::{CausalRefutation, Column, Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::{
    run_simulations, CausalRefuter, RefutationContext, SignificanceConfig,
    DEFAULT_NUM_SIMULATIONS,
};

/// Name of the synthetic covariate added to the adjustment set.
const RANDOM_CAUSE_COLUMN: &str = "w_random";

/// Settings for [`RandomCommonCauseRefuter`].
#[derive(Debug, Clone)]
pub struct RandomCommonCauseRefuterConfig {
    /// Number of independent draws of the synthetic covariate.
    pub num_simulations: usize,
    /// Worker threads; 1 runs sequentially.
    pub n_jobs: usize,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    /// Significance-test settings.
    pub significance: SignificanceConfig,
}

impl Default for RandomCommonCauseRefuterConfig {
    fn default() -> Self {
        Self {
            num_simulations: DEFAULT_NUM_SIMULATIONS,
            n_jobs: 1,
            seed: None,
            significance: SignificanceConfig::default(),
        }
    }
}

/// Refutes an estimate by appending a standard-normal covariate to the
/// adjustment set. Since the new variable is independent of everything,
/// adjusting for it must not move the estimate.
pub struct RandomCommonCauseRefuter<'a> {
    ctx: RefutationContext<'a>,
    config: RandomCommonCauseRefuterConfig,
}

impl<'a> RandomCommonCauseRefuter<'a> {
    /// Validate the configuration against the context.
    pub fn new(
        ctx: RefutationContext<'a>,
        config: RandomCommonCauseRefuterConfig,
    ) -> Result<Self> {
        if ctx.data.has_column(RANDOM_CAUSE_COLUMN) {
            return Err(Error::Validation(format!(
                "dataset already has a '{RANDOM_CAUSE_COLUMN}' column"
            )));
        }
        Ok(Self { ctx, config })
    }
}

impl CausalRefuter for RandomCommonCauseRefuter<'_> {
    fn refute_estimate(&self) -> Result<Vec<CausalRefutation>> {
        let n = self.ctx.data.n_rows();
        let mut estimand = self.ctx.target_estimand.clone();
        estimand.backdoor_variables.push(RANDOM_CAUSE_COLUMN.to_string());

        let simulations =
            run_simulations(self.config.num_simulations, self.config.n_jobs, |i| {
                let mut rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_rng(&mut rand::rng()),
                };
                let standard_normal = Normal::new(0.0, 1.0)
                    .map_err(|e| Error::Computation(format!("normal distribution: {e}")))?;
                let draw: Vec<f64> = (0..n).map(|_| standard_normal.sample(&mut rng)).collect();
                let augmented =
                    self.ctx.data.assign(RANDOM_CAUSE_COLUMN, Column::Float(draw))?;
                let estimator = self.ctx.factory.build(&augmented, &estimand, self.ctx.estimate)?;
                Ok(estimator.estimate_effect()?.value)
            })?;

        let new_effect = simulations.iter().sum::<f64>() / simulations.len() as f64;
        let mut refutation = CausalRefutation::new(
            self.ctx.estimate.value,
            new_effect,
            "Refute: Add a random common cause",
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
    use rand::Rng;

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
    fn independent_covariate_leaves_estimate_unchanged() {
        let (data, estimand, estimate) = linear_world(400, 13);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let refuter = RandomCommonCauseRefuter::new(
            ctx,
            RandomCommonCauseRefuterConfig { seed: Some(29), ..Default::default() },
        )
        .unwrap();
        let results = refuter.refute_estimate().unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].new_effect - estimate.value).abs() < 0.05);
        let sig = results[0].significance.as_ref().unwrap();
        assert!(!sig.is_significant, "p={}", sig.p_value);
    }

    #[test]
    fn original_estimand_is_not_mutated() {
        let (data, estimand, estimate) = linear_world(100, 3);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let refuter = RandomCommonCauseRefuter::new(
            ctx,
            RandomCommonCauseRefuterConfig {
                num_simulations: 5,
                seed: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        refuter.refute_estimate().unwrap();
        assert_eq!(estimand.backdoor_variables, vec!["W0".to_string()]);
        assert!(!data.has_column("w_random"));
    }

    #[test]
    fn rejects_colliding_column_name() {
        let (data, estimand, estimate) = linear_world(20, 4);
        let data = data.assign("w_random", Column::Float(vec![0.0; 20])).unwrap();
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        assert!(
            RandomCommonCauseRefuter::new(ctx, RandomCommonCauseRefuterConfig::default()).is_err()
        );
    }
}
