use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Arity mismatch in section '{section}': expected {expected} fields, got {actual}")]
    ArityMismatch {
        section: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid policy line: {0}")]
    InvalidPolicyLine(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Operation not supported by adapter: {0}")]
    NotSupported(&'static str),

    #[error("No adapter configured")]
    NoAdapter,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for PolicyError {
    fn from(err: config::ConfigError) -> Self {
        PolicyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
