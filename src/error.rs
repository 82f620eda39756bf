//! Error types for the industrial time-series toolkit

use thiserror::Error;

/// Result type alias for industrial operations
pub type Result<T> = std::result::Result<T, IndustrialError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum IndustrialError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature generation error: {0}")]
    FeatureError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Ensemble error: {0}")]
    EnsembleError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown feature generator: {0}")]
    UnknownGenerator(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl From<polars::error::PolarsError> for IndustrialError {
    fn from(err: polars::error::PolarsError) -> Self {
        IndustrialError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for IndustrialError {
    fn from(err: serde_json::Error) -> Self {
        IndustrialError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for IndustrialError {
    fn from(err: serde_yaml::Error) -> Self {
        IndustrialError::ConfigError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for IndustrialError {
    fn from(err: ndarray::ShapeError) -> Self {
        IndustrialError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndustrialError::UnknownGenerator("fourier".to_string());
        assert_eq!(err.to_string(), "Unknown feature generator: fourier");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IndustrialError = io_err.into();
        assert!(matches!(err, IndustrialError::IoError(_)));
    }

    #[test]
    fn test_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{ not: a list").unwrap_err();
        let err: IndustrialError = yaml_err.into();
        assert!(matches!(err, IndustrialError::ConfigError(_)));
    }
}
