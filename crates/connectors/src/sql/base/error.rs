use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any Postgres driver error.
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Any MySQL driver error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// A value could not be converted to the parameter type the server expects.
    #[error("Cannot bind {value} as {target}")]
    Coercion { value: String, target: String },

    /// The statement was never prepared on this connection, or was released.
    #[error("Unknown prepared statement #{0}")]
    UnknownStatement(u64),

    /// Wrong number of parameters for a statement.
    #[error("Statement #{id} expects {expected} parameters, got {actual}")]
    ParameterCount {
        id: u64,
        expected: usize,
        actual: usize,
    },

    /// Writing rows to the database failed at the application level.
    #[error("Write error: {0}")]
    Write(String),

    /// An error occurred while building a SQL query.
    #[error("Query build error: {0}")]
    QueryBuild(String),

    #[error("Connection is closed")]
    Closed,
}

/// Errors happening during connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported database scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),
}
