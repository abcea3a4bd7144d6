use connectors::{
    file::csv::error::FileError,
    sql::base::error::{ConnectorError, DbError},
};
use engine_config::error::ConfigError;
use engine_runtime::error::ImportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(#[from] FileError),

    #[error("Failed to run the import: {0}")]
    Import(#[from] ImportError),

    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("No input files found under {0}")]
    NoInput(String),

    #[error("{0} worker(s) failed")]
    WorkersFailed(usize),
}
