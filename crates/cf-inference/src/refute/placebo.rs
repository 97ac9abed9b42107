//! Placebo-treatment refuter: swap the treatment for a fake one.

use cf_core::{CausalRefutation, Column, Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::{
    run_simulations, CausalRefuter, RefutationContext, SignificanceConfig,
    DEFAULT_NUM_SIMULATIONS,
};

/// Prefix for the synthetic treatment (and instrument) columns.
const PLACEBO_PREFIX: &str = "placebo_";

/// How the placebo treatment is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceboKind {
    /// Independent standard-normal draws.
    #[default]
    RandomData,
    /// A row permutation of the real treatment. Required for IV estimands,
    /// where the instruments are permuted with the same row order so the
    /// instrument-treatment link is broken consistently.
    Permute,
}

/// Settings for [`PlaceboTreatmentRefuter`].
#[derive(Debug, Clone)]
pub struct PlaceboTreatmentRefuterConfig {
    /// Placebo generation strategy.
    pub placebo_kind: PlaceboKind,
    /// Number of placebo draws.
    pub num_simulations: usize,
    /// Worker threads; 1 runs sequentially.
    pub n_jobs: usize,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    /// Significance-test settings.
    pub significance: SignificanceConfig,
}

impl Default for PlaceboTreatmentRefuterConfig {
    fn default() -> Self {
        Self {
            placebo_kind: PlaceboKind::default(),
            num_simulations: DEFAULT_NUM_SIMULATIONS,
            n_jobs: 1,
            seed: None,
            significance: SignificanceConfig::default(),
        }
    }
}

/// Refutes an estimate by replacing the treatment with a variable that has no
/// causal link to the outcome. The re-estimated effect should collapse to
/// zero; the significance test therefore compares zero against the simulated
/// distribution.
pub struct PlaceboTreatmentRefuter<'a> {
    ctx: RefutationContext<'a>,
    config: PlaceboTreatmentRefuterConfig,
}

impl<'a> PlaceboTreatmentRefuter<'a> {
    /// Validate the configuration against the context.
    pub fn new(
        ctx: RefutationContext<'a>,
        config: PlaceboTreatmentRefuterConfig,
    ) -> Result<Self> {
        if ctx.target_estimand.is_iv() && config.placebo_kind != PlaceboKind::Permute {
            return Err(Error::Validation(
                "instrumental-variable estimands require the permute placebo".into(),
            ));
        }
        for name in &ctx.target_estimand.treatment_variable {
            if !ctx.data.has_column(name) {
                return Err(Error::Validation(format!(
                    "treatment '{name}' is not a column of the dataset"
                )));
            }
        }
        Ok(Self { ctx, config })
    }
}

impl CausalRefuter for PlaceboTreatmentRefuter<'_> {
    fn refute_estimate(&self) -> Result<Vec<CausalRefutation>> {
        let n = self.ctx.data.n_rows();

        // The estimand is cloned with rewritten names; the caller's estimand
        // and dataset are untouched, so no restore step exists.
        let mut estimand = self.ctx.target_estimand.clone();
        for name in &mut estimand.treatment_variable {
            *name = format!("{PLACEBO_PREFIX}{name}");
        }
        let permute_instruments = self.ctx.target_estimand.is_iv();
        if permute_instruments {
            for name in &mut estimand.instrumental_variables {
                *name = format!("{PLACEBO_PREFIX}{name}");
            }
        }

        let simulations =
            run_simulations(self.config.num_simulations, self.config.n_jobs, |i| {
                let mut rng = match self.config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_rng(&mut rand::rng()),
                };
                let mut sample = self.ctx.data.clone();
                match self.config.placebo_kind {
                    PlaceboKind::RandomData => {
                        for name in &self.ctx.target_estimand.treatment_variable {
                            let placebo = random_placebo(sample.column(name)?, n, &mut rng)?;
                            sample = sample.assign(format!("{PLACEBO_PREFIX}{name}"), placebo)?;
                        }
                    }
                    PlaceboKind::Permute => {
                        // One permutation shared by the treatment and (for IV)
                        // the instruments keeps their mutual structure intact
                        // while severing both from the outcome.
                        let mut order: Vec<usize> = (0..n).collect();
                        order.shuffle(&mut rng);
                        for name in &self.ctx.target_estimand.treatment_variable {
                            let permuted = sample.column(name)?.take(&order);
                            sample =
                                sample.assign(format!("{PLACEBO_PREFIX}{name}"), permuted)?;
                        }
                        if permute_instruments {
                            for name in &self.ctx.target_estimand.instrumental_variables {
                                let permuted = sample.column(name)?.take(&order);
                                sample =
                                    sample.assign(format!("{PLACEBO_PREFIX}{name}"), permuted)?;
                            }
                        }
                    }
                }
                let estimator = self.ctx.factory.build(&sample, &estimand, self.ctx.estimate)?;
                Ok(estimator.estimate_effect()?.value)
            })?;

        let new_effect = simulations.iter().sum::<f64>() / simulations.len() as f64;
        let mut refutation = CausalRefutation::new(
            self.ctx.estimate.value,
            new_effect,
            "Refute: Use a Placebo Treatment",
        );
        // A placebo should produce a null effect, so zero is the reference.
        refutation.add_significance_test_results(super::test_significance(
            &self.config.significance,
            &simulations,
            0.0,
        )?);
        Ok(vec![refutation])
    }
}

/// Draw a placebo column matching the treatment's type: standard normal for
/// floats, fair coin flips for booleans, uniform over the observed range for
/// integers and over the observed labels for categoricals.
fn random_placebo(treatment: &Column, n: usize, rng: &mut StdRng) -> Result<Column> {
    Ok(match treatment {
        Column::Float(_) => {
            let standard_normal = Normal::new(0.0, 1.0)
                .map_err(|e| Error::Computation(format!("normal distribution: {e}")))?;
            Column::Float((0..n).map(|_| standard_normal.sample(rng)).collect())
        }
        Column::Bool(_) => Column::Bool((0..n).map(|_| rng.random::<bool>()).collect()),
        Column::Int(v) => {
            let min = *v.iter().min().unwrap_or(&0);
            let max = *v.iter().max().unwrap_or(&0);
            Column::Int((0..n).map(|_| rng.random_range(min..=max)).collect())
        }
        Column::Categorical(_) => {
            let labels = treatment.categories()?;
            Column::Categorical(
                (0..n).map(|_| labels[rng.random_range(0..labels.len())].clone()).collect(),
            )
        }
    })
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
    fn placebo_effect_collapses_to_zero() {
        let (data, estimand, estimate) = linear_world(400, 31);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        for kind in [PlaceboKind::RandomData, PlaceboKind::Permute] {
            let refuter = PlaceboTreatmentRefuter::new(
                ctx,
                PlaceboTreatmentRefuterConfig {
                    placebo_kind: kind,
                    seed: Some(7),
                    ..Default::default()
                },
            )
            .unwrap();
            let results = refuter.refute_estimate().unwrap();
            assert_eq!(results.len(), 1);
            assert!(results[0].new_effect.abs() < 0.5, "{kind:?}: {}", results[0].new_effect);
            let sig = results[0].significance.as_ref().unwrap();
            assert!(!sig.is_significant, "{kind:?}: p={}", sig.p_value);
        }
        // Inputs survive untouched.
        assert!(!data.has_column("placebo_v0"));
        assert_eq!(estimand.treatment_variable, vec!["v0".to_string()]);
    }

    #[test]
    fn iv_estimand_requires_permutation() {
        let (data, _, estimate) = linear_world(50, 2);
        let estimand = IdentifiedEstimand::iv("v0", "y", vec!["W0".into()]);
        let factory = LinearEstimatorFactory;
        let ctx = RefutationContext {
            data: &data,
            target_estimand: &estimand,
            estimate: &estimate,
            factory: &factory,
        };
        let err = PlaceboTreatmentRefuter::new(ctx, PlaceboTreatmentRefuterConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("permute"));

        let config = PlaceboTreatmentRefuterConfig {
            placebo_kind: PlaceboKind::Permute,
            num_simulations: 3,
            seed: Some(9),
            ..Default::default()
        };
        let refuter = PlaceboTreatmentRefuter::new(ctx, config).unwrap();
        // Instruments get the same permutation, so 2SLS still has columns to
        // work with even though its slope is now meaningless.
        let results = refuter.refute_estimate().unwrap();
        assert_eq!(results.len(), 1);
    }
}
