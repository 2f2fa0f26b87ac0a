//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid resource reference '{reference}': expected <type>/<name>")]
    InvalidReference { reference: String },

    #[error("Unsupported resource type '{kind}' (supported: {supported})")]
    UnsupportedType { kind: String, supported: String },

    #[error("Invalid duration '{value}': {message}")]
    InvalidDuration { value: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Input errors are never retried and are reported to the caller as-is
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidReference { .. }
                | CoreError::UnsupportedType { .. }
                | CoreError::InvalidDuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
