//! Analysis configuration.

use crate::error::{DaaError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the REML mixed-model fitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmmConfig {
    /// Maximum iterations for REML estimation.
    pub max_iter: usize,
    /// Convergence tolerance for the REML log-likelihood.
    pub tol: f64,
    /// Small ridge value for numerical stability.
    pub ridge: f64,
    /// Lower bound for variance components (prevents collapse to zero).
    pub var_lower_bound: f64,
}

impl Default for LmmConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-6,
            ridge: 1e-8,
            var_lower_bound: 1e-10,
        }
    }
}

/// Configuration for one analysis invocation.
///
/// The response reference level is passed explicitly through every fitting
/// call rather than read from ambient state, so fits stay pure functions of
/// their inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Response level encoded as 0; the other level is encoded as 1, so a
    /// positive coefficient means higher abundance in the non-reference
    /// group. Applied identically to every population in a batch.
    pub reference_response_level: String,
    /// False discovery rate threshold for the significance flag, in (0, 1].
    pub fdr_threshold: f64,
    /// Timepoint defining the baseline cohort (`time_from_treatment_start`).
    pub reference_timepoint: f64,
    /// Epsilon nudging proportions off the [0, 1] boundaries before the
    /// logit transform.
    pub boundary_epsilon: f64,
    /// Minimum distinct subjects required in each response group for a
    /// population to be fit.
    pub min_subjects_per_group: usize,
    /// Mixed-model fitter settings.
    pub lmm: LmmConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            reference_response_level: "no".to_string(),
            fdr_threshold: 0.05,
            reference_timepoint: 0.0,
            boundary_epsilon: 1e-6,
            min_subjects_per_group: 2,
            lmm: LmmConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Validate configuration values that would make a whole batch
    /// meaningless. Data-dependent checks (reference level presence) happen
    /// at fit time.
    pub fn validate(&self) -> Result<()> {
        if !(self.fdr_threshold > 0.0 && self.fdr_threshold <= 1.0) {
            return Err(DaaError::InvalidParameter(format!(
                "FDR threshold must be in (0, 1], got {}",
                self.fdr_threshold
            )));
        }
        if !(self.boundary_epsilon > 0.0 && self.boundary_epsilon < 0.5) {
            return Err(DaaError::InvalidParameter(format!(
                "Boundary epsilon must be a small positive value, got {}",
                self.boundary_epsilon
            )));
        }
        if self.reference_response_level.is_empty() {
            return Err(DaaError::InvalidParameter(
                "Reference response level cannot be empty".to_string(),
            ));
        }
        if self.min_subjects_per_group == 0 {
            return Err(DaaError::InvalidParameter(
                "min_subjects_per_group must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}
