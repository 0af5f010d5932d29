//! Differential abundance of immune cell populations across clinical
//! response groups.
//!
//! This library turns a flat, joined table of per-sample cell counts into a
//! ranked table of populations whose relative frequency differs between
//! responders and non-responders, accounting for repeated measures
//! (multiple samples per subject) and multiple testing.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core records, configuration, and result types
//! - **freq**: Per-sample relative frequency derivation
//! - **filter**: Predicate filtering over the long-format table
//! - **cohort**: Descriptive cohort aggregates
//! - **model**: Per-population logit mixed models (random intercept per subject)
//! - **correct**: Benjamini-Hochberg false discovery rate correction
//! - **pipeline**: End-to-end analysis composition
//!
//! # Example
//!
//! ```no_run
//! use cyto_daa::prelude::*;
//!
//! let records = CellCountRecord::from_csv("cell-count.csv").unwrap();
//!
//! let filters = FilterSet::new()
//!     .treatments(["tr1"])
//!     .sample_types(["PBMC"]);
//!
//! let report = run_analysis(&records, &filters, &AnalysisConfig::default()).unwrap();
//! for r in &report.results {
//!     println!("{}: {}", r.model.population, r.significance.label());
//! }
//! ```

pub mod cohort;
pub mod correct;
pub mod data;
pub mod error;
pub mod filter;
pub mod freq;
pub mod model;
pub mod pipeline;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::cohort::{cohort_size, distinct_samples, distinct_subjects, samples_per_project};
    pub use crate::correct::{bh_adjust, correct_for_multiple_testing};
    pub use crate::data::{
        AnalysisConfig, CellCountRecord, CorrectedModelResult, FitStatus, FrequencyRecord,
        LmmConfig, ModelResult, Significance, CELL_POPULATIONS,
    };
    pub use crate::error::{DaaError, Result};
    pub use crate::filter::{apply_filters, FilterSet};
    pub use crate::freq::{derive_frequencies, FrequencyTable};
    pub use crate::model::{fit_models, logit_with_epsilon};
    pub use crate::pipeline::{run_analysis, AnalysisReport, CohortSummary};
}
