use connectors::sql::base::error::DbError;
use engine_config::OperationMode;
use engine_core::error::EvalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediatorError {
    #[error("Partition {partition} does not exist ({partitions} partitions)")]
    UnknownPartition { partition: usize, partitions: usize },

    #[error("Routing is disabled for this import")]
    RoutingDisabled,

    #[error("The shared queue was closed: no consumers left")]
    NoConsumers,
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("primaryKeys required for {0} mode")]
    MissingPrimaryKeys(OperationMode),

    #[error(
        "Transform definition for column '{0}' produces SQL, which is only supported for insertValues and updateValues"
    )]
    SqlTransform(String),

    #[error("Evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Hand-off failed: {0}")]
    Mediator(#[from] MediatorError),

    #[error("Handler closed with {0} buffered records")]
    Unflushed(usize),

    #[error("Handler is already closed")]
    Closed,
}
