//! Predicate filtering over the long-format frequency table.
//!
//! A [`FilterSet`] is a conjunction of optional per-dimension predicates.
//! `None` means no restriction on that dimension; a supplied but empty
//! accepted set means "exclude everything" for it. Filtering preserves row
//! order and full sample/subject granularity.

use crate::data::FrequencyRecord;
use serde::{Deserialize, Serialize};

/// A set of optional row predicates, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSet {
    /// Accepted project identifiers.
    pub projects: Option<Vec<String>>,
    /// Accepted treatments.
    pub treatments: Option<Vec<String>>,
    /// Accepted response labels.
    pub responses: Option<Vec<String>>,
    /// Accepted sample types.
    pub sample_types: Option<Vec<String>>,
    /// Accepted subject conditions.
    pub conditions: Option<Vec<String>>,
    /// Accepted subject sexes.
    pub sexes: Option<Vec<String>>,
    /// Accepted subject ages.
    pub ages: Option<Vec<u32>>,
    /// Inclusive range on `time_from_treatment_start`.
    pub time_range: Option<(f64, f64)>,
}

impl FilterSet {
    /// An unrestricted filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given projects.
    pub fn projects<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.projects = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given treatments.
    pub fn treatments<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.treatments = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given response labels.
    pub fn responses<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.responses = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given sample types.
    pub fn sample_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.sample_types = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given subject conditions.
    pub fn conditions<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.conditions = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given subject sexes.
    pub fn sexes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.sexes = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given subject ages.
    pub fn ages<I: IntoIterator<Item = u32>>(mut self, values: I) -> Self {
        self.ages = Some(values.into_iter().collect());
        self
    }

    /// Restrict `time_from_treatment_start` to an inclusive range.
    pub fn time_range(mut self, min: f64, max: f64) -> Self {
        self.time_range = Some((min, max));
        self
    }

    /// Whether no predicate is supplied.
    pub fn is_unrestricted(&self) -> bool {
        self == &Self::default()
    }

    /// Evaluate the conjunction against one record.
    ///
    /// A record whose metadata value is absent fails any supplied predicate
    /// on that dimension.
    pub fn matches(&self, record: &FrequencyRecord) -> bool {
        let r = &record.base;

        accepts_required(&self.projects, &r.project)
            && accepts_required(&self.conditions, &r.condition)
            && accepts_optional(&self.treatments, r.treatment.as_deref())
            && accepts_optional(&self.responses, r.response.as_deref())
            && accepts_optional(&self.sample_types, r.sample_type.as_deref())
            && accepts_optional(&self.sexes, r.sex.as_deref())
            && match &self.ages {
                None => true,
                Some(accepted) => r.age.is_some_and(|a| accepted.contains(&a)),
            }
            && match self.time_range {
                None => true,
                Some((min, max)) => r
                    .time_from_treatment_start
                    .is_some_and(|t| t >= min && t <= max),
            }
    }
}

fn accepts_required(accepted: &Option<Vec<String>>, value: &str) -> bool {
    match accepted {
        None => true,
        Some(set) => set.iter().any(|v| v == value),
    }
}

fn accepts_optional(accepted: &Option<Vec<String>>, value: Option<&str>) -> bool {
    match accepted {
        None => true,
        Some(set) => value.is_some_and(|v| set.iter().any(|a| a == v)),
    }
}

/// Select the records satisfying every supplied predicate.
///
/// Stable relative order is preserved and the input is left untouched.
pub fn apply_filters(records: &[FrequencyRecord], filters: &FilterSet) -> Vec<FrequencyRecord> {
    records
        .iter()
        .filter(|r| filters.matches(r))
        .cloned()
        .collect()
}
