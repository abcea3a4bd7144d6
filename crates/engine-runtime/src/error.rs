use connectors::{
    file::csv::error::FileError,
    sql::base::error::{ConnectorError, DbError},
};
use engine_config::error::ConfigError;
use engine_core::error::EvalError;
use engine_processing::error::{HandlerError, MediatorError};
use thiserror::Error;

/// Top-level errors of an import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Reading the input failed.
    #[error("Input error: {0}")]
    Source(#[from] FileError),

    #[error("Record handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Hand-off error: {0}")]
    Mediator(#[from] MediatorError),

    /// A mapped column index is past the end of a row.
    #[error("Row {position} has no field {index} (mapped to column '{column}')")]
    MissingField {
        position: u64,
        index: usize,
        column: String,
    },

    /// An error occurred while joining a task.
    /// This usually indicates that the task was cancelled or panicked.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
