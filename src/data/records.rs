//! Long-format cell-count records and CSV ingestion.
//!
//! The core operates on a flat, already-joined table: one row per
//! (sample, population) pair carrying the sample and subject metadata
//! alongside the raw count. `CellCountRecord::from_csv` turns the wide
//! per-sample source file (one column per reference population) into that
//! long format.

use crate::error::{DaaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reference set of immune cell populations.
///
/// Every sample in a well-formed table carries one count per population in
/// this set, so per-sample proportions sum to 1.
pub const CELL_POPULATIONS: [&str; 5] = [
    "b_cell",
    "cd8_t_cell",
    "cd4_t_cell",
    "nk_cell",
    "monocyte",
];

/// One row of the joined cell-count table: a single population's raw count
/// within a single sample, plus the sample/subject metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCountRecord {
    /// Sample identifier (unique per drawn sample).
    pub sample: String,
    /// Subject identifier. Multiple samples may share a subject.
    pub subject: String,
    /// Project identifier.
    pub project: String,
    /// Cell population name.
    pub population: String,
    /// Raw cell count, non-negative.
    pub count: u64,
    /// Subject condition (e.g. "healthy", "melanoma").
    pub condition: String,
    /// Subject age, if recorded.
    pub age: Option<u32>,
    /// Subject sex, if recorded.
    pub sex: Option<String>,
    /// Treatment the sample was taken under, if any.
    pub treatment: Option<String>,
    /// Clinical response label (e.g. "yes"/"no"), if known.
    pub response: Option<String>,
    /// Sample type (e.g. "PBMC"), if recorded.
    pub sample_type: Option<String>,
    /// Time from treatment start, if recorded. 0 marks baseline.
    pub time_from_treatment_start: Option<f64>,
}

/// A `CellCountRecord` extended with its sample total and relative frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRecord {
    /// The underlying count record.
    #[serde(flatten)]
    pub base: CellCountRecord,
    /// Sum of counts across all populations of this record's sample.
    pub total_count: u64,
    /// `count / total_count`, in [0, 1].
    pub proportion: f64,
    /// `proportion * 100.0`.
    pub percent: f64,
}

impl FrequencyRecord {
    /// Derive a frequency record from a count record and its sample total.
    ///
    /// The caller guarantees `total > 0`.
    pub(crate) fn from_record(record: &CellCountRecord, total: u64) -> Self {
        let proportion = record.count as f64 / total as f64;
        Self {
            base: record.clone(),
            total_count: total,
            proportion,
            percent: proportion * 100.0,
        }
    }
}

/// Metadata columns required in the wide source CSV, in addition to one
/// column per reference population.
const REQUIRED_COLUMNS: [&str; 10] = [
    "project",
    "subject",
    "condition",
    "age",
    "sex",
    "treatment",
    "response",
    "sample",
    "sample_type",
    "time_from_treatment_start",
];

fn opt_str(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl CellCountRecord {
    /// Load long-format records from the wide per-sample CSV.
    ///
    /// Each source row describes one sample and carries one count column per
    /// population in [`CELL_POPULATIONS`]; it expands to one record per
    /// population. Empty metadata cells become `None`; empty or non-integer
    /// count cells are an error.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CellCountRecord>> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        let index_of = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| DaaError::MissingColumn(name.to_string()))
        };

        let meta_idx: Vec<usize> = REQUIRED_COLUMNS
            .iter()
            .map(|c| index_of(c))
            .collect::<Result<_>>()?;
        let pop_idx: Vec<usize> = CELL_POPULATIONS
            .iter()
            .map(|p| index_of(p))
            .collect::<Result<_>>()?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let field = |i: usize| row.get(meta_idx[i]).unwrap_or("").trim();

            let project = field(0).to_string();
            let subject = field(1).to_string();
            let condition = field(2).to_string();
            let age = match field(3) {
                "" => None,
                s => Some(s.parse::<u32>().map_err(|_| DaaError::InvalidParameter(
                    format!("Invalid age '{}' for sample '{}'", s, field(7)),
                ))?),
            };
            let sex = opt_str(field(4));
            let treatment = opt_str(field(5));
            let response = opt_str(field(6));
            let sample = field(7).to_string();
            let sample_type = opt_str(field(8));
            let time_from_treatment_start = match field(9) {
                "" => None,
                s => Some(s.parse::<f64>().map_err(|_| DaaError::InvalidParameter(
                    format!("Invalid time_from_treatment_start '{}' for sample '{}'", s, sample),
                ))?),
            };

            for (pop, &idx) in CELL_POPULATIONS.iter().zip(&pop_idx) {
                let raw = row.get(idx).unwrap_or("").trim();
                let count = raw.parse::<u64>().map_err(|_| DaaError::InvalidCount {
                    value: raw.to_string(),
                    population: pop.to_string(),
                    sample: sample.clone(),
                })?;

                records.push(CellCountRecord {
                    sample: sample.clone(),
                    subject: subject.clone(),
                    project: project.clone(),
                    population: pop.to_string(),
                    count,
                    condition: condition.clone(),
                    age,
                    sex: sex.clone(),
                    treatment: treatment.clone(),
                    response: response.clone(),
                    sample_type: sample_type.clone(),
                    time_from_treatment_start,
                });
            }
        }

        if records.is_empty() {
            return Err(DaaError::EmptyData(
                "Cell-count table has no data rows".to_string(),
            ));
        }

        Ok(records)
    }
}
