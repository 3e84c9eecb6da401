//! Error types for rv-storage

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Core(#[from] rv_core::Error),

    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(u64),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("More than one run matches {0}")]
    AmbiguousRun(String),

    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::InstrumentNotFound(_)
                | StorageError::ExperimentNotFound(_)
                | StorageError::RunNotFound(_)
        )
    }
}
