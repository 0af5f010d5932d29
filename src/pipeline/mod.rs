//! End-to-end analysis pipeline.
//!
//! Stage order: derive frequencies -> apply filters -> fit one model per
//! population -> correct the full batch. The fit stage is a barrier: every
//! population's fit completes before correction sees any p-value.

use crate::cohort::{cohort_size, distinct_samples, distinct_subjects, samples_per_project};
use crate::correct::correct_for_multiple_testing;
use crate::data::{AnalysisConfig, CellCountRecord, CorrectedModelResult};
use crate::error::Result;
use crate::filter::{apply_filters, FilterSet};
use crate::freq::derive_frequencies;
use crate::model::fit_models;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Descriptive aggregates over the filtered cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortSummary {
    /// Distinct subjects with a record at the reference timepoint.
    pub baseline_subjects: usize,
    /// Distinct subjects across the filtered cohort.
    pub n_subjects: usize,
    /// Distinct samples across the filtered cohort.
    pub n_samples: usize,
    /// Distinct sample counts per project, descending.
    pub samples_per_project: Vec<(String, usize)>,
}

/// Full output of one analysis invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Per-population results ranked by adjusted p-value, untested last.
    pub results: Vec<CorrectedModelResult>,
    /// Samples dropped for having zero total counts.
    pub n_excluded_samples: usize,
    /// Cohort aggregates after filtering.
    pub cohort: CohortSummary,
}

impl AnalysisReport {
    /// Count of populations flagged significant.
    pub fn n_significant(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.significance == crate::data::Significance::Significant)
            .count()
    }

    /// Write the ranked result table as TSV.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(
            writer,
            "population\testimate\tstd_error\tstatistic\tp_value\tp_adj\tsignificance\tstatus\tn_samples\tn_subjects"
        )?;
        for r in &self.results {
            let p_adj = r
                .p_adj
                .map(|q| format!("{:.6e}", q))
                .unwrap_or_else(|| "NA".to_string());
            writeln!(
                writer,
                "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6e}\t{}\t{}\t{}\t{}\t{}",
                r.model.population,
                r.model.estimate,
                r.model.std_error,
                r.model.statistic,
                r.model.p_value,
                p_adj,
                r.significance.label(),
                r.model.status.label(),
                r.model.n_samples,
                r.model.n_subjects,
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Serialize the full report to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run the full analysis pipeline over raw long-format records.
///
/// Configuration misuse surfaces as a fatal error; per-sample and
/// per-population data problems are absorbed into the report.
pub fn run_analysis(
    records: &[CellCountRecord],
    filters: &FilterSet,
    config: &AnalysisConfig,
) -> Result<AnalysisReport> {
    config.validate()?;

    let frequencies = derive_frequencies(records);
    let filtered = apply_filters(&frequencies.records, filters);

    let cohort = CohortSummary {
        baseline_subjects: cohort_size(&filtered, config.reference_timepoint),
        n_subjects: distinct_subjects(&filtered),
        n_samples: distinct_samples(&filtered),
        samples_per_project: samples_per_project(&filtered),
    };

    // All fits join here before correction runs on the batch.
    let fits = fit_models(&filtered, config)?;
    let mut results = correct_for_multiple_testing(&fits, config.fdr_threshold)?;

    // Rank: tested populations by adjusted then raw p-value, untested last,
    // population name as the deterministic tiebreak.
    results.sort_by(|a, b| {
        let key = |r: &CorrectedModelResult| {
            (
                r.p_adj.unwrap_or(f64::INFINITY),
                if r.model.p_value.is_finite() {
                    r.model.p_value
                } else {
                    f64::INFINITY
                },
            )
        };
        let (qa, pa) = key(a);
        let (qb, pb) = key(b);
        qa.partial_cmp(&qb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.model.population.cmp(&b.model.population))
    });

    Ok(AnalysisReport {
        results,
        n_excluded_samples: frequencies.n_excluded_samples,
        cohort,
    })
}
