//! Per-population mixed-model fitting.
//!
//! For each distinct population in a filtered cohort, fits
//! `logit(proportion) ~ response + (1 | subject)` and reports the response
//! coefficient with a Wald t-test p-value. Populations that fail the
//! data-sufficiency preconditions are reported as labeled non-results; one
//! population's failure never aborts the batch.

pub mod lmm;

pub use lmm::logit_with_epsilon;

use crate::data::{AnalysisConfig, FitStatus, FrequencyRecord, ModelResult};
use crate::error::{DaaError, Result};
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Fit one repeated-measures model per population.
///
/// The response predictor is two-level categorical: the configured reference
/// level is encoded 0, the other level 1, so a positive coefficient means
/// higher relative abundance among non-reference (e.g. responding) subjects.
/// The encoding is applied identically to every population in the batch.
///
/// Records without a response label are ignored. Fatal errors are reserved
/// for configuration misuse: a reference level absent from the data, or more
/// than two response levels present.
pub fn fit_models(
    records: &[FrequencyRecord],
    config: &AnalysisConfig,
) -> Result<Vec<ModelResult>> {
    config.validate()?;

    let labeled: Vec<&FrequencyRecord> = records
        .iter()
        .filter(|r| r.base.response.is_some())
        .collect();

    let levels: BTreeSet<&str> = labeled
        .iter()
        .filter_map(|r| r.base.response.as_deref())
        .collect();

    if !levels.contains(config.reference_response_level.as_str()) {
        return Err(DaaError::UnknownLevel {
            column: "response".to_string(),
            level: config.reference_response_level.clone(),
        });
    }
    if levels.len() > 2 {
        return Err(DaaError::InvalidParameter(format!(
            "Response must have two levels, found {:?}",
            levels
        )));
    }

    // Distinct populations in first-appearance order
    let mut populations: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for r in &labeled {
        if seen.insert(r.base.population.as_str()) {
            populations.push(r.base.population.as_str());
        }
    }

    if populations.is_empty() {
        return Err(DaaError::EmptyData(
            "No response-labeled records to fit".to_string(),
        ));
    }

    // Per-population fits are independent; the collect() joins them all
    // before any downstream correction can run.
    let results: Vec<ModelResult> = populations
        .par_iter()
        .map(|population| fit_population(population, &labeled, config))
        .collect();

    Ok(results)
}

/// Fit a single population, absorbing data-sufficiency failures into the
/// returned result.
fn fit_population(
    population: &str,
    labeled: &[&FrequencyRecord],
    config: &AnalysisConfig,
) -> ModelResult {
    let rows: Vec<&FrequencyRecord> = labeled
        .iter()
        .filter(|r| r.base.population == population)
        .copied()
        .collect();

    let n_samples = rows.len();

    // Encode response and index subjects
    let mut subject_index: HashMap<&str, usize> = HashMap::new();
    let mut subject_idx = Vec::with_capacity(n_samples);
    let mut response = Vec::with_capacity(n_samples);
    let mut y = Vec::with_capacity(n_samples);
    let mut subjects_by_group: [HashSet<&str>; 2] = [HashSet::new(), HashSet::new()];

    for r in &rows {
        let level = r.base.response.as_deref().unwrap_or_default();
        let encoded = if level == config.reference_response_level {
            0.0
        } else {
            1.0
        };
        let subject = r.base.subject.as_str();
        let next = subject_index.len();
        let idx = *subject_index.entry(subject).or_insert(next);

        subjects_by_group[encoded as usize].insert(subject);
        subject_idx.push(idx);
        response.push(encoded);
        y.push(logit_with_epsilon(r.proportion, config.boundary_epsilon));
    }

    let n_subjects = subject_index.len();

    if subjects_by_group[0].is_empty() || subjects_by_group[1].is_empty() {
        return ModelResult::insufficient(
            population,
            "only one response level present".to_string(),
            n_samples,
            n_subjects,
        );
    }
    let min_group = subjects_by_group[0].len().min(subjects_by_group[1].len());
    if min_group < config.min_subjects_per_group {
        return ModelResult::insufficient(
            population,
            format!(
                "needs at least {} subjects per response group, smallest group has {}",
                config.min_subjects_per_group, min_group
            ),
            n_samples,
            n_subjects,
        );
    }
    if n_samples < 3 {
        return ModelResult::insufficient(
            population,
            format!("needs at least 3 samples, got {}", n_samples),
            n_samples,
            n_subjects,
        );
    }

    let fit = lmm::fit_random_intercept(&y, &response, &subject_idx, n_subjects, &config.lmm);

    let statistic = if fit.std_error > 0.0 && fit.std_error.is_finite() {
        fit.estimate / fit.std_error
    } else {
        f64::NAN
    };

    // Two-sided Wald p-value; unusable unless the fit converged
    let p_value = if fit.converged && statistic.is_finite() && fit.df_residual > 0.0 {
        match StudentsT::new(0.0, 1.0, fit.df_residual) {
            Ok(t) => 2.0 * (1.0 - t.cdf(statistic.abs())),
            Err(_) => f64::NAN,
        }
    } else {
        f64::NAN
    };

    ModelResult {
        population: population.to_string(),
        estimate: fit.estimate,
        std_error: fit.std_error,
        statistic,
        p_value,
        status: if fit.converged {
            FitStatus::Converged
        } else {
            FitStatus::NotConverged
        },
        n_samples,
        n_subjects,
    }
}
