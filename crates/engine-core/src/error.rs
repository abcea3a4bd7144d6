use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Unknown map function '{0}'")]
    UnknownMapFunction(String),

    #[error("Value for '{column}' is SQL and cannot be evaluated in process")]
    SqlNotEvaluable { column: String },

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Function '{function}' failed for column '{column}': {message}")]
    Function {
        function: String,
        column: String,
        message: String,
    },

    #[error("Map function '{function}' failed: {message}")]
    Map { function: String, message: String },
}
