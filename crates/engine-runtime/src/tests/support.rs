use async_trait::async_trait;
use connectors::{
    factory::ConnectionFactory,
    file::csv::{error::FileError, source::RowSource},
    sql::base::{
        connection::{DatabaseKind, SqlConnection},
        dialect::{Dialect, Postgres},
        error::{ConnectorError, DbError},
        statement::{PreparedStatement, Statement},
    },
};
use engine_config::{Configuration, OperationMode};
use model::{
    core::value::Value,
    records::{raw::RawRow, record::Record},
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

/// Rows served from memory.
pub struct VecSource {
    rows: VecDeque<RawRow>,
}

impl VecSource {
    pub fn numbered(count: u64) -> Box<dyn RowSource> {
        Box::new(VecSource {
            rows: (1..=count)
                .map(|n| RawRow::new(n, vec![n.to_string(), format!("name-{n}")]))
                .collect(),
        })
    }

    pub fn from_rows(rows: Vec<RawRow>) -> Box<dyn RowSource> {
        Box::new(VecSource { rows: rows.into() })
    }
}

impl RowSource for VecSource {
    fn next_row(&mut self) -> Result<Option<RawRow>, FileError> {
        Ok(self.rows.pop_front())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

/// Accepts every write, finds nothing on lookup.
#[derive(Default)]
pub struct CountingConnection {
    pub written: Arc<AtomicU64>,
    pub fail_writes: bool,
    pub closed: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

#[async_trait]
impl SqlConnection for CountingConnection {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Other("counting".into())
    }

    fn dialect(&self) -> &dyn Dialect {
        &Postgres
    }

    async fn prepare(&self, statement: Statement) -> Result<PreparedStatement, DbError> {
        Ok(PreparedStatement::new(self.next_id.fetch_add(1, Ordering::Relaxed), statement))
    }

    async fn query(&self, _: &PreparedStatement, _: &[Value]) -> Result<Vec<Record>, DbError> {
        Ok(Vec::new())
    }

    async fn execute_batch(
        &self,
        _statement: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError> {
        if self.fail_writes {
            return Err(DbError::Write("disk full".into()));
        }
        self.written.fetch_add(rows.len() as u64, Ordering::Relaxed);
        Ok(rows.len() as u64)
    }

    async fn release(&self, _: &PreparedStatement) -> Result<(), DbError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        self.closed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Hands out counting connections sharing one set of counters. The
/// connection numbered `failing` (if any) rejects every write.
#[derive(Default)]
pub struct CountingFactory {
    pub written: Arc<AtomicU64>,
    pub closed: Arc<AtomicUsize>,
    pub opened: AtomicUsize,
    pub failing: Option<usize>,
    pub refuse: AtomicBool,
}

#[async_trait]
impl ConnectionFactory for CountingFactory {
    async fn connect(&self) -> Result<Arc<dyn SqlConnection>, ConnectorError> {
        if self.refuse.load(Ordering::Relaxed) {
            return Err(ConnectorError::UnsupportedScheme("refused".into()));
        }
        let n = self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CountingConnection {
            written: Arc::clone(&self.written),
            closed: Arc::clone(&self.closed),
            fail_writes: self.failing == Some(n),
            ..CountingConnection::default()
        }))
    }
}

pub fn config(mode: OperationMode) -> Configuration {
    Configuration {
        operation_mode: mode,
        connection_url: "postgres://localhost/test".into(),
        target_table: "people".into(),
        primary_keys: vec!["id".into()],
        column_mappings: BTreeMap::from([(0, "id".to_string()), (1, "name".to_string())]),
        batch_size: 4,
        ..Configuration::default()
    }
}
