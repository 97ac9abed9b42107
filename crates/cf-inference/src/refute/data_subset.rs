//! Data-subset refuter: re-estimate on random subsets of the rows.

use cf_core::{CausalRefutation, Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{
    run_simulations, CausalRefuter, RefutationContext, SignificanceConfig,
    DEFAULT_NUM_SIMULATIONS,
};

/// Settings for [`DataSubsetRefuter`].
#[derive(Debug, Clone)]
pub struct DataSubsetRefuterConfig {
    /// Fraction of rows kept in each subset, in (0, 1].
    pub subset_fraction: f64,
    /// Number of subsets to draw.
    pub num_simulations: usize,
    /// Worker threads; 1 runs sequentially.
    pub n_jobs: usize,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    /// Significance-test settings.
    pub significance: SignificanceConfig,
}

impl Default for DataSubsetRefuterConfig {
    fn default() -> Self {
        Self {
            subset_fraction: 0.8,
            num_simulations: DEFAULT_NUM_SIMULATIONS,
            n_jobs: 1,
            seed: None,
            significance: SignificanceConfig::default(),
        }
    }
}

/// Refutes an estimate by re-estimating on random row subsets drawn without
/// replacement. An estimate that only holds on the full sample is fragile.
pub struct DataSubsetRefuter<'a> {
    ctx: RefutationContext<'a>,
    config: DataSubsetRefuterConfig,
}

impl<'a> DataSubsetRefuter<'a> {
    /// Validate the configuration against the context.
    pub fn new(ctx: RefutationContext<'a>, config: DataSubsetRefuterConfig) -> Result<Self> {
        if !(config.subset_fraction > 0.0 && config.subset_fraction <= 1.0) {
            return Err(Error::Validation(format!(
                "subset_fraction must be in (0, 1], got {}",
                config.subset_fraction
            )));
        }
        let subset_rows = (config.subset_fraction * ctx.data.n_rows() as f64).floor() as usize;
        if subset_rows == 0 {
            return Err(Error::Validation("subset_fraction keeps no rows".into()));
        }
        Ok(Self { ctx, config })
    }
}

impl CausalRefuter for DataSubsetRefuter<'_> {
    fn refute_estimate(&self) -> Result<Vec<CausalRefutation>> {
        let n = self.ctx.data.n_rows();
        let subset_rows = (self.config.subset_fraction * n as f64).floor() as usize;
        let simulations =
            run_simulations(self.config.num_simulations, self.config.n_jobs, |i| {
                let mut rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_rng(&mut rand::rng()),
                };
                let indices: Vec<usize> =
                    rand::seq::index::sample(&mut rng, n, subset_rows).into_vec();
                let subset = self.ctx.data.take(&indices)?;
                let estimator =
                    self.ctx.factory.build(&subset, self.ctx.target_estimand, self.ctx.estimate)?;
                Ok(estimator.estimate_effect()?.value)
            })?;

        let new_effect = simulations.iter().sum::<f64>() / simulations.len() as f64;
        let mut refutation = CausalRefutation::new(
            self.ctx.estimate.value,
            new_effect,
            "Refute: Use a subset of data",
        );
        refutation.add_significance_test_results(super::test_significance(
            &self.config.significance,
            &simulations,
            self.ctx.estimate.value,
        )?);
        Ok(vec![refutation])
    }
}
