use thiserror::Error;

/// A run-number query that matches none of the accepted shapes.
///
/// The message is meant to be shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown status code: {0}")]
    UnknownStatus(String),

    #[error("Invalid run query: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Invalid variable name encoding: {0}")]
    VariableName(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
