//! Descriptive aggregates over a filtered cohort.

use crate::data::FrequencyRecord;
use std::collections::{HashMap, HashSet};

/// Count distinct subjects with a record at the reference timepoint.
///
/// Subjects are counted once regardless of how many qualifying samples they
/// have. Returns zero when nothing matches.
pub fn cohort_size(records: &[FrequencyRecord], reference_timepoint: f64) -> usize {
    records
        .iter()
        .filter(|r| r.base.time_from_treatment_start == Some(reference_timepoint))
        .map(|r| r.base.subject.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Count distinct subjects across all records.
pub fn distinct_subjects(records: &[FrequencyRecord]) -> usize {
    records
        .iter()
        .map(|r| r.base.subject.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Count distinct samples across all records.
pub fn distinct_samples(records: &[FrequencyRecord]) -> usize {
    records
        .iter()
        .map(|r| r.base.sample.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct sample counts per project, sorted by count descending then
/// project name for a deterministic order.
pub fn samples_per_project(records: &[FrequencyRecord]) -> Vec<(String, usize)> {
    let mut samples: HashMap<&str, HashSet<&str>> = HashMap::new();
    for r in records {
        samples
            .entry(r.base.project.as_str())
            .or_default()
            .insert(r.base.sample.as_str());
    }

    let mut out: Vec<(String, usize)> = samples
        .into_iter()
        .map(|(project, set)| (project.to_string(), set.len()))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
