use crate::sql::base::{
    dialect::Dialect,
    error::DbError,
    statement::{PreparedStatement, Statement},
};
use async_trait::async_trait;
use model::{core::value::Value, records::record::Record};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseKind {
    MySql,
    Postgres,
    Other(String),
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::MySql => write!(f, "mysql"),
            DatabaseKind::Postgres => write!(f, "postgres"),
            DatabaseKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// One database session.
///
/// A connection is used by a single worker at a time; the handlers of that
/// worker share it to keep every write for a key on the same session.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    fn dialect(&self) -> &dyn Dialect;

    async fn prepare(&self, statement: Statement) -> Result<PreparedStatement, DbError>;

    /// Runs a prepared SELECT, returning each row as a record keyed by column name.
    async fn query(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
    ) -> Result<Vec<Record>, DbError>;

    /// Executes a prepared statement once per parameter row and returns the
    /// number of affected rows.
    async fn execute_batch(
        &self,
        statement: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError>;

    async fn release(&self, statement: &PreparedStatement) -> Result<(), DbError>;

    async fn ping(&self) -> Result<(), DbError>;

    async fn close(&self) -> Result<(), DbError>;
}

pub(crate) fn check_parameter_count(
    statement: &PreparedStatement,
    params: &[Value],
) -> Result<(), DbError> {
    let expected = statement.statement().parameter_count();
    if params.len() != expected {
        return Err(DbError::ParameterCount {
            id: statement.id(),
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}
