use crate::{
    error::HandlerError, handler::context::HandlerContext, mediator::Router,
    partition::Partitioning,
};
use async_trait::async_trait;
use connectors::sql::base::{
    connection::{DatabaseKind, SqlConnection},
    dialect::{Dialect, Postgres},
    error::DbError,
    statement::{PreparedStatement, Statement, StatementShape},
};
use engine_config::Configuration;
use engine_core::{
    eval::{evaluator::Evaluators, functions::FunctionRegistry},
    metrics::Metrics,
};
use model::{core::value::Value, records::record::Record};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

/// Connection that answers lookups from a fixed row set and records every
/// batch it is asked to execute.
#[derive(Default)]
pub struct ScriptedConnection {
    pub existing: Mutex<Vec<Record>>,
    pub executed: Mutex<Vec<(String, Vec<Vec<Value>>)>>,
    pub selects: AtomicU64,
    pub released: AtomicU64,
    pub fail_writes: Mutex<bool>,
    next_id: AtomicU64,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_rows(rows: Vec<Record>) -> Arc<Self> {
        let connection = Self::default();
        *connection.existing.lock().unwrap() = rows;
        Arc::new(connection)
    }

    /// Executed batches whose SQL starts with `verb`.
    pub fn batches(&self, verb: &str) -> Vec<Vec<Vec<Value>>> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|(sql, _)| sql.starts_with(verb))
            .map(|(_, rows)| rows.clone())
            .collect()
    }
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Other("scripted".into())
    }

    fn dialect(&self) -> &dyn Dialect {
        &Postgres
    }

    async fn prepare(&self, statement: Statement) -> Result<PreparedStatement, DbError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(PreparedStatement::new(id, statement))
    }

    async fn query(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
    ) -> Result<Vec<Record>, DbError> {
        self.selects.fetch_add(1, Ordering::Relaxed);
        let StatementShape::SelectByKeys { keys, .. } = statement.shape() else {
            return Err(DbError::Write("not a select".into()));
        };
        let rows = self.existing.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| {
                params.chunks(keys.len()).any(|tuple| {
                    keys.iter()
                        .zip(tuple)
                        .all(|(key, value)| row.value(key).matches(value))
                })
            })
            .cloned()
            .collect())
    }

    async fn execute_batch(
        &self,
        statement: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(DbError::Write("constraint violation".into()));
        }
        self.executed
            .lock()
            .unwrap()
            .push((statement.sql().to_string(), rows.to_vec()));
        Ok(rows.len() as u64)
    }

    async fn release(&self, _statement: &PreparedStatement) -> Result<(), DbError> {
        self.released.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}

/// Router that only records where records were sent.
#[derive(Default)]
pub struct RecordingRouter {
    pub partitions: usize,
    pub sent: Mutex<Vec<(usize, Record)>>,
}

#[async_trait]
impl Router for RecordingRouter {
    fn partitions(&self) -> usize {
        self.partitions
    }

    async fn dispatch_to(
        &self,
        _from: usize,
        record: Record,
        target: usize,
    ) -> Result<(), crate::error::MediatorError> {
        self.sent.lock().unwrap().push((target, record));
        Ok(())
    }
}

pub fn context(
    config: Configuration,
    connection: Arc<ScriptedConnection>,
    router: Option<Arc<dyn Router>>,
    partition: Partitioning,
) -> Result<HandlerContext, HandlerError> {
    context_with(config, connection, router, partition, Metrics::new())
}

pub fn context_with(
    config: Configuration,
    connection: Arc<ScriptedConnection>,
    router: Option<Arc<dyn Router>>,
    partition: Partitioning,
    metrics: Metrics,
) -> Result<HandlerContext, HandlerError> {
    let evaluators = Evaluators::compile(&config, &FunctionRegistry::with_builtins())?;
    HandlerContext::new(
        Arc::new(config),
        Arc::new(evaluators),
        connection,
        router,
        partition,
        Arc::new(metrics),
    )
}

/// `id, name` table keyed by `id`.
pub fn people(mode: engine_config::OperationMode) -> Configuration {
    let mut config = Configuration::default();
    config.operation_mode = mode;
    config.target_table = "people".into();
    config.connection_url = "postgres://localhost/test".into();
    config.column_mappings.insert(0, "id".into());
    config.column_mappings.insert(1, "name".into());
    config.primary_keys = vec!["id".into()];
    config
}

pub fn person(id: i64, name: &str) -> Record {
    [("id", Value::Int(id)), ("name", Value::from(name))]
        .into_iter()
        .collect()
}
