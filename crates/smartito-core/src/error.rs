use thiserror::Error;

/// Top-level error type for Smartito.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for SmartitoError` (or the reverse) so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmartitoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

impl From<toml::de::Error> for SmartitoError {
    fn from(err: toml::de::Error) -> Self {
        SmartitoError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SmartitoError {
    fn from(err: toml::ser::Error) -> Self {
        SmartitoError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SmartitoError {
    fn from(err: serde_json::Error) -> Self {
        SmartitoError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Smartito operations.
pub type Result<T> = std::result::Result<T, SmartitoError>;
