//! Frequency derivation: raw counts to per-sample relative frequencies.

use crate::data::{CellCountRecord, FrequencyRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output of [`derive_frequencies`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyTable {
    /// Frequency records, one per surviving input record, in input order.
    pub records: Vec<FrequencyRecord>,
    /// Number of samples excluded because their counts summed to zero.
    pub n_excluded_samples: usize,
    /// Sample identifiers of the excluded samples, in first-appearance order.
    pub excluded_samples: Vec<String>,
}

impl FrequencyTable {
    /// Number of frequency records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Derive per-sample relative frequencies from raw counts.
///
/// Groups records by sample identifier, sums counts to a sample total, then
/// divides each record's count by its sample's total. Samples whose counts
/// sum to zero are excluded rather than divided, and surfaced on the returned
/// table. Output order matches input order.
pub fn derive_frequencies(records: &[CellCountRecord]) -> FrequencyTable {
    let mut totals: HashMap<&str, u64> = HashMap::new();
    for record in records {
        *totals.entry(record.sample.as_str()).or_insert(0) += record.count;
    }

    let mut excluded_samples: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let total = totals[record.sample.as_str()];
        if total == 0 {
            if !excluded_samples.contains(&record.sample) {
                excluded_samples.push(record.sample.clone());
            }
            continue;
        }
        out.push(FrequencyRecord::from_record(record, total));
    }

    FrequencyTable {
        records: out,
        n_excluded_samples: excluded_samples.len(),
        excluded_samples,
    }
}
