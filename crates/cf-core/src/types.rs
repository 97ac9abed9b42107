//! Common data types for counterfact

use serde::{Deserialize, Serialize};

/// A point estimate of a causal effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalEstimate {
    /// Estimated effect value.
    pub value: f64,
}

impl CausalEstimate {
    /// Create a new estimate.
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

/// An identified statistical estimand: which observed variables play which
/// role when estimating the causal effect.
///
/// `Clone` gives the deep copy refuters use before rewriting variable names;
/// the original estimand is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiedEstimand {
    /// Treatment variable names.
    pub treatment_variable: Vec<String>,
    /// Outcome variable names.
    pub outcome_variable: Vec<String>,
    /// Backdoor (adjustment-set) variable names.
    pub backdoor_variables: Vec<String>,
    /// Instrumental variable names.
    pub instrumental_variables: Vec<String>,
    /// Effect-modifier variable names.
    pub effect_modifiers: Vec<String>,
    /// Identification method label; `"iv"`-prefixed selects IV behavior.
    pub identifier_method: String,
}

impl IdentifiedEstimand {
    /// Backdoor-identified estimand.
    pub fn backdoor(
        treatment: impl Into<String>,
        outcome: impl Into<String>,
        backdoor_variables: Vec<String>,
    ) -> Self {
        Self {
            treatment_variable: vec![treatment.into()],
            outcome_variable: vec![outcome.into()],
            backdoor_variables,
            instrumental_variables: Vec::new(),
            effect_modifiers: Vec::new(),
            identifier_method: "backdoor".to_string(),
        }
    }

    /// IV-identified estimand.
    pub fn iv(
        treatment: impl Into<String>,
        outcome: impl Into<String>,
        instrumental_variables: Vec<String>,
    ) -> Self {
        Self {
            treatment_variable: vec![treatment.into()],
            outcome_variable: vec![outcome.into()],
            backdoor_variables: Vec::new(),
            instrumental_variables,
            effect_modifiers: Vec::new(),
            identifier_method: "iv".to_string(),
        }
    }

    /// Whether the estimand was identified by an instrumental-variable method.
    pub fn is_iv(&self) -> bool {
        self.identifier_method.starts_with("iv")
    }

    /// Variables a refuter may perturb: backdoor variables, instruments and
    /// effect modifiers.
    pub fn variables_of_interest(&self) -> Vec<String> {
        let mut vars = self.backdoor_variables.clone();
        vars.extend(self.instrumental_variables.iter().cloned());
        vars.extend(self.effect_modifiers.iter().cloned());
        vars
    }
}

/// Outcome of a two-sided significance test against the simulated
/// distribution of perturbed estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignificanceResult {
    /// Two-sided p-value.
    pub p_value: f64,
    /// z-score when the normal approximation was used.
    pub z_score: Option<f64>,
    /// Significance level the decision was taken at.
    pub significance_level: f64,
    /// Whether the reference value is statistically distinguishable from the
    /// simulated distribution.
    pub is_significant: bool,
}

/// Result of one refutation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalRefutation {
    /// Original effect estimate (or the null reference the refuter compares
    /// against, e.g. zero for placebo treatments).
    pub estimated_effect: f64,
    /// Mean effect over the simulated perturbed datasets.
    pub new_effect: f64,
    /// Human-readable refutation label.
    pub refutation_type: String,
    /// Attached significance-test results, if any.
    pub significance: Option<SignificanceResult>,
}

impl CausalRefutation {
    /// Create a refutation record without significance results.
    pub fn new(estimated_effect: f64, new_effect: f64, refutation_type: impl Into<String>) -> Self {
        Self {
            estimated_effect,
            new_effect,
            refutation_type: refutation_type.into(),
            significance: None,
        }
    }

    /// Attach significance-test results.
    pub fn add_significance_test_results(&mut self, result: SignificanceResult) {
        self.significance = Some(result);
    }
}

impl std::fmt::Display for CausalRefutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.refutation_type)?;
        writeln!(f, "Estimated effect:{}", self.estimated_effect)?;
        write!(f, "New effect:{}", self.new_effect)?;
        if let Some(sig) = &self.significance {
            write!(f, "\np value:{}", sig.p_value)?;
        }
        Ok(())
    }
}
