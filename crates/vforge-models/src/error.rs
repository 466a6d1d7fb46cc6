//! Validation errors for job records and operation parameters.

use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised while turning a job record into an executable request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Job record has neither an operation nor a prebuilt argument list")]
    MissingOperation,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid params for {operation}: {message}")]
    InvalidParams { operation: String, message: String },

    #[error("Invalid {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid resolution '{0}', expected WIDTHxHEIGHT")]
    InvalidResolution(String),
}

impl ValidationError {
    pub fn invalid_params(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
