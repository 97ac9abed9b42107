//! Refutation framework.
//!
//! A refuter perturbs the data (or the estimand), re-estimates the effect
//! many times through an [`EstimatorFactory`], and tests whether the original
//! estimate survives. Shared machinery lives here: the simulation driver, the
//! two-sided significance tests, and the perturbation-variable selection
//! grammar.

use cf_core::{
    CausalEstimate, CausalRefutation, Dataset, Error, EstimatorFactory, IdentifiedEstimand,
    Result, SignificanceResult,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::{ContinuousCDF, Normal};

pub mod bootstrap;
pub mod data_subset;
pub mod dummy_outcome;
pub mod placebo;
pub mod random_common_cause;

pub use bootstrap::{BootstrapRefuter, BootstrapRefuterConfig};
pub use data_subset::{DataSubsetRefuter, DataSubsetRefuterConfig};
pub use dummy_outcome::{DummyOutcomeRefuter, DummyOutcomeRefuterConfig, Transformation};
pub use placebo::{PlaceboTreatmentRefuter, PlaceboTreatmentRefuterConfig, PlaceboKind};
pub use random_common_cause::{RandomCommonCauseRefuter, RandomCommonCauseRefuterConfig};

/// Default simulation count shared by the refuters.
pub const DEFAULT_NUM_SIMULATIONS: usize = 100;

/// Everything a refuter borrows from the analysis it is checking.
#[derive(Clone, Copy)]
pub struct RefutationContext<'a> {
    /// Observational data the original estimate was fitted on.
    pub data: &'a Dataset,
    /// The identified estimand being refuted.
    pub target_estimand: &'a IdentifiedEstimand,
    /// The original effect estimate.
    pub estimate: &'a CausalEstimate,
    /// Rebuilds estimators against perturbed inputs.
    pub factory: &'a dyn EstimatorFactory,
}

/// A refutation strategy.
pub trait CausalRefuter {
    /// Run the refutation and return one record per tested hypothesis.
    ///
    /// The default is a stub so partial strategies can exist while under
    /// construction.
    fn refute_estimate(&self) -> Result<Vec<CausalRefutation>> {
        Err(Error::NotImplemented("refute_estimate is not implemented for this refuter".into()))
    }
}

// ---- significance testing ----

/// How to turn the simulated effect distribution into a p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignificanceMethod {
    /// Empirical percentile when enough simulations exist, normal otherwise.
    #[default]
    Auto,
    /// Empirical two-sided percentile of the reference among the simulations.
    Bootstrap,
    /// z-test against the simulated mean and standard deviation.
    Normal,
}

/// Significance-test settings.
#[derive(Debug, Clone, Copy)]
pub struct SignificanceConfig {
    /// p-value construction.
    pub method: SignificanceMethod,
    /// Decision threshold.
    pub significance_level: f64,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self { method: SignificanceMethod::Auto, significance_level: 0.05 }
    }
}

/// Simulation count below which `Auto` falls back to the normal
/// approximation.
const BOOTSTRAP_MIN_SIMULATIONS: usize = 100;

/// Two-sided test of `reference` against the simulated effect distribution.
///
/// A small p-value means the original estimate sits in the tails of what the
/// perturbation produces, i.e. the perturbation changed the estimate and the
/// refutation raises a flag. A reference near the simulated center yields a
/// p-value near one.
pub fn test_significance(
    config: &SignificanceConfig,
    simulations: &[f64],
    reference: f64,
) -> Result<SignificanceResult> {
    if simulations.is_empty() {
        return Err(Error::Validation("significance test requires at least one simulation".into()));
    }
    let method = match config.method {
        SignificanceMethod::Auto => {
            if simulations.len() >= BOOTSTRAP_MIN_SIMULATIONS {
                SignificanceMethod::Bootstrap
            } else {
                SignificanceMethod::Normal
            }
        }
        other => other,
    };
    let (p_value, z_score) = match method {
        SignificanceMethod::Bootstrap => {
            let n = simulations.len() as f64;
            let below = simulations.iter().filter(|&&s| s < reference).count() as f64;
            let equal = simulations.iter().filter(|&&s| s == reference).count() as f64;
            let quantile = (below + 0.5 * equal) / n;
            ((2.0 * quantile.min(1.0 - quantile)).clamp(0.0, 1.0), None)
        }
        SignificanceMethod::Normal => {
            let n = simulations.len() as f64;
            let mean = simulations.iter().sum::<f64>() / n;
            let std = (simulations.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>()
                / (n - 1.0).max(1.0))
            .sqrt();
            if std == 0.0 {
                let p = if reference == mean { 1.0 } else { 0.0 };
                (p, None)
            } else {
                let z = (reference - mean) / std;
                let normal = Normal::new(0.0, 1.0)
                    .map_err(|e| Error::Computation(format!("normal distribution: {e}")))?;
                (2.0 * (1.0 - normal.cdf(z.abs())), Some(z))
            }
        }
        SignificanceMethod::Auto => unreachable!("resolved above"),
    };
    Ok(SignificanceResult {
        p_value,
        z_score,
        significance_level: config.significance_level,
        is_significant: p_value <= config.significance_level,
    })
}

// ---- variable selection ----

/// Which of the estimand's variables a refuter perturbs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VariableSelection {
    /// Every variable of interest.
    #[default]
    All,
    /// No variables (disables the perturbation).
    None,
    /// A random subset of the given size.
    CountOf(usize),
    /// Exactly these variables.
    Select(Vec<String>),
    /// Every variable of interest except these.
    Deselect(Vec<String>),
}

impl VariableSelection {
    /// Parse a name list: plain names select, `-`-prefixed names deselect.
    /// Mixing the two forms is rejected.
    pub fn from_list(names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(VariableSelection::None);
        }
        let deselects = names.iter().filter(|n| n.starts_with('-')).count();
        if deselects == 0 {
            Ok(VariableSelection::Select(names.to_vec()))
        } else if deselects == names.len() {
            Ok(VariableSelection::Deselect(
                names.iter().map(|n| n[1..].to_string()).collect(),
            ))
        } else {
            Err(Error::Validation(
                "variable list mixes selected and '-'-deselected names".into(),
            ))
        }
    }

    /// Resolve the selection against the candidate variables.
    pub fn choose(&self, candidates: &[String], seed: Option<u64>) -> Result<Vec<String>> {
        match self {
            VariableSelection::All => Ok(candidates.to_vec()),
            VariableSelection::None => Ok(Vec::new()),
            VariableSelection::CountOf(count) => {
                if *count > candidates.len() {
                    return Err(Error::Validation(format!(
                        "cannot choose {count} variables from {} candidates",
                        candidates.len()
                    )));
                }
                let mut rng = match seed {
                    Some(s) => StdRng::seed_from_u64(s),
                    None => StdRng::from_rng(&mut rand::rng()),
                };
                let picked = rand::seq::index::sample(&mut rng, candidates.len(), *count);
                Ok(picked.iter().map(|i| candidates[i].clone()).collect())
            }
            VariableSelection::Select(names) => {
                for name in names {
                    if !candidates.contains(name) {
                        return Err(Error::Validation(format!(
                            "'{name}' is not among the estimand's variables of interest"
                        )));
                    }
                }
                Ok(names.clone())
            }
            VariableSelection::Deselect(names) => {
                for name in names {
                    if !candidates.contains(name) {
                        return Err(Error::Validation(format!(
                            "cannot deselect '{name}': not among the variables of interest"
                        )));
                    }
                }
                Ok(candidates.iter().filter(|c| !names.contains(c)).cloned().collect())
            }
        }
    }
}

// ---- simulation driver ----

/// Run `num_simulations` independent simulations, sequentially or on a scoped
/// thread pool, preserving index order. The first error aborts the run.
pub(crate) fn run_simulations<F>(num_simulations: usize, n_jobs: usize, f: F) -> Result<Vec<f64>>
where
    F: Fn(usize) -> Result<f64> + Send + Sync,
{
    if num_simulations == 0 {
        return Err(Error::Validation("num_simulations must be at least 1".into()));
    }
    if n_jobs <= 1 {
        (0..num_simulations).map(f).collect()
    } else {
        use rayon::prelude::*;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .build()
            .map_err(|e| Error::Computation(format!("thread pool: {e}")))?;
        pool.install(|| (0..num_simulations).into_par_iter().map(f).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnfinishedRefuter;
    impl CausalRefuter for UnfinishedRefuter {}

    #[test]
    fn default_refuter_is_a_stub() {
        let err = UnfinishedRefuter.refute_estimate().unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn central_reference_is_not_significant() {
        let sims: Vec<f64> = (0..200).map(|i| i as f64 / 200.0).collect();
        let config = SignificanceConfig::default();
        let result = test_significance(&config, &sims, 0.5).unwrap();
        assert!(result.p_value > 0.95, "p={}", result.p_value);
        assert!(!result.is_significant);
        // Auto picked the empirical test at this simulation count.
        assert!(result.z_score.is_none());
    }

    #[test]
    fn tail_reference_is_significant() {
        let sims: Vec<f64> = (0..200).map(|i| i as f64 / 200.0).collect();
        let config = SignificanceConfig::default();
        let result = test_significance(&config, &sims, 5.0).unwrap();
        assert!(result.p_value <= 0.05, "p={}", result.p_value);
        assert!(result.is_significant);
    }

    #[test]
    fn normal_method_reports_z_score() {
        let sims = vec![0.9, 1.0, 1.1, 1.0, 0.95, 1.05];
        let config =
            SignificanceConfig { method: SignificanceMethod::Normal, significance_level: 0.05 };
        let result = test_significance(&config, &sims, 1.0).unwrap();
        let z = result.z_score.expect("normal test must set a z-score");
        assert!(z.abs() < 0.1, "z={z}");
        assert!(result.p_value > 0.9);

        let far = test_significance(&config, &sims, 10.0).unwrap();
        assert!(far.is_significant);
    }

    #[test]
    fn small_auto_runs_use_the_normal_test() {
        let sims = vec![1.0, 1.1, 0.9, 1.05, 0.95];
        let result = test_significance(&SignificanceConfig::default(), &sims, 1.0).unwrap();
        assert!(result.z_score.is_some());
    }

    #[test]
    fn selection_parsing_enforces_homogeneity() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            VariableSelection::from_list(&names(&["W0", "W1"])).unwrap(),
            VariableSelection::Select(names(&["W0", "W1"]))
        );
        assert_eq!(
            VariableSelection::from_list(&names(&["-W0"])).unwrap(),
            VariableSelection::Deselect(names(&["W0"]))
        );
        assert!(VariableSelection::from_list(&names(&["W0", "-W1"])).is_err());
        assert_eq!(VariableSelection::from_list(&[]).unwrap(), VariableSelection::None);
    }

    #[test]
    fn selection_resolves_against_candidates() {
        let candidates: Vec<String> = vec!["W0".into(), "W1".into(), "Z0".into()];
        assert_eq!(VariableSelection::All.choose(&candidates, None).unwrap(), candidates);
        assert!(VariableSelection::None.choose(&candidates, None).unwrap().is_empty());

        let picked = VariableSelection::CountOf(2).choose(&candidates, Some(1)).unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|p| candidates.contains(p)));
        assert!(VariableSelection::CountOf(4).choose(&candidates, Some(1)).is_err());

        assert!(VariableSelection::Select(vec!["Q".into()]).choose(&candidates, None).is_err());
        assert_eq!(
            VariableSelection::Deselect(vec!["W1".into()]).choose(&candidates, None).unwrap(),
            vec!["W0".to_string(), "Z0".to_string()]
        );
    }

    #[test]
    fn simulations_preserve_order_and_propagate_errors() {
        let values = run_simulations(8, 1, |i| Ok(i as f64)).unwrap();
        assert_eq!(values, (0..8).map(|i| i as f64).collect::<Vec<_>>());

        let parallel = run_simulations(32, 4, |i| Ok(i as f64 * 2.0)).unwrap();
        assert_eq!(parallel[31], 62.0);

        let err = run_simulations(4, 1, |i| {
            if i == 2 {
                Err(Error::Computation("boom".into()))
            } else {
                Ok(0.0)
            }
        })
        .unwrap_err();
        assert!(err.to_string().contains("boom"));

        assert!(run_simulations(0, 1, |_| Ok(0.0)).is_err());
    }
}
