//! Error types for the cyto-daa library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DaaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{0}' in cell-count table")]
    MissingColumn(String),

    #[error("Invalid count value '{value}' for population '{population}' in sample '{sample}'")]
    InvalidCount {
        value: String,
        population: String,
        sample: String,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Reference level '{level}' not present in column '{column}'")]
    UnknownLevel { column: String, level: String },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, DaaError>;
