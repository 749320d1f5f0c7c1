//! Error types for the report pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

/// Main error type for the report pipeline
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Imputation error: {0}")]
    Imputation(String),

    #[error("Split error: {0}")]
    Split(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Attribution error: {0}")]
    Attribution(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,
}

/// Failures of the headless-browser screenshot step
#[derive(Error, Debug)]
pub enum BrowserError {
    /// No browser executable could be located or launched
    #[error("Browser not available: {0}")]
    NotFound(String),

    /// The browser started but failed to produce the capture
    #[error("Browser driver failure: {0}")]
    Driver(String),

    #[error("Screenshot failed: {0}")]
    Other(String),
}

impl From<polars::error::PolarsError> for ReportError {
    fn from(err: polars::error::PolarsError) -> Self {
        ReportError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for ReportError {
    fn from(err: serde_json::Error) -> Self {
        ReportError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ReportError {
    fn from(err: ndarray::ShapeError) -> Self {
        ReportError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
