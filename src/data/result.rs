//! Result types for the per-population fits and their corrected batch.

use serde::{Deserialize, Serialize};

/// Outcome of attempting to fit one population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitStatus {
    /// The REML optimizer converged; the p-value is usable.
    Converged,
    /// The optimizer did not converge; estimates are reported but the
    /// p-value is unusable and the population is excluded from correction.
    NotConverged,
    /// Preconditions failed (reason attached); nothing was fit.
    Insufficient(String),
}

impl FitStatus {
    /// Short label for tabular output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::NotConverged => "not_converged",
            Self::Insufficient(_) => "insufficient_data",
        }
    }
}

/// Result of one per-population mixed-model fit.
///
/// Created fresh for each analysis invocation and owned by the caller; the
/// core never persists these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    /// Cell population name.
    pub population: String,
    /// Estimated response coefficient on the logit scale. Positive values
    /// mean higher relative abundance in the non-reference response group.
    pub estimate: f64,
    /// Standard error of the estimate.
    pub std_error: f64,
    /// Wald t-statistic.
    pub statistic: f64,
    /// Two-sided raw p-value; NaN whenever the fit did not converge.
    pub p_value: f64,
    /// Fit outcome.
    pub status: FitStatus,
    /// Number of samples used in the fit.
    pub n_samples: usize,
    /// Number of distinct subjects used in the fit.
    pub n_subjects: usize,
}

impl ModelResult {
    /// Build a labeled non-result for a population that failed preconditions.
    pub fn insufficient(
        population: &str,
        reason: String,
        n_samples: usize,
        n_subjects: usize,
    ) -> Self {
        Self {
            population: population.to_string(),
            estimate: f64::NAN,
            std_error: f64::NAN,
            statistic: f64::NAN,
            p_value: f64::NAN,
            status: FitStatus::Insufficient(reason),
            n_samples,
            n_subjects,
        }
    }

    /// The p-value, if this fit converged to a usable one.
    pub fn usable_p_value(&self) -> Option<f64> {
        match self.status {
            FitStatus::Converged if self.p_value.is_finite() => Some(self.p_value),
            _ => None,
        }
    }
}

/// Three-state significance call for a corrected result.
///
/// "Tested but not significant" and "not tested" are deliberately distinct;
/// presentation layers must never conflate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Significance {
    /// Tested; adjusted p-value at or below the FDR threshold.
    Significant,
    /// Tested; adjusted p-value above the FDR threshold.
    NotSignificant,
    /// Not part of the correction set (insufficient data or non-convergent).
    NotTested,
}

impl Significance {
    /// Short label for tabular output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Significant => "significant",
            Self::NotSignificant => "not_significant",
            Self::NotTested => "not_tested",
        }
    }
}

/// A `ModelResult` annotated with its batch-level adjusted p-value.
///
/// Derived only once the full batch of fits is known; never computed per-row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectedModelResult {
    /// The underlying per-population fit.
    pub model: ModelResult,
    /// Benjamini-Hochberg adjusted p-value; `None` when the population was
    /// excluded from the correction set.
    pub p_adj: Option<f64>,
    /// Significance call at the configured FDR threshold.
    pub significance: Significance,
}

impl CorrectedModelResult {
    /// Whether this population was part of the correction set.
    pub fn tested(&self) -> bool {
        self.p_adj.is_some()
    }
}
