//! Data structures for response-group differential abundance analysis.

mod config;
mod records;
mod result;

pub use config::{AnalysisConfig, LmmConfig};
pub use records::{CellCountRecord, FrequencyRecord, CELL_POPULATIONS};
pub use result::{CorrectedModelResult, FitStatus, ModelResult, Significance};
