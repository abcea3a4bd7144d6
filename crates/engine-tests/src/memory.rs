//! An in-memory stand-in for a SQL database.
//!
//! Statements are interpreted from their [`StatementShape`], never from the
//! SQL text. Raw SQL slots are stored as the SQL string itself.

use async_trait::async_trait;
use connectors::{
    factory::ConnectionFactory,
    sql::base::{
        connection::{DatabaseKind, SqlConnection},
        dialect::{Dialect, Postgres},
        error::{ConnectorError, DbError},
        statement::{ColumnSlot, PreparedStatement, Slot, Statement, StatementShape},
    },
};
use model::{
    core::{fingerprint::Fingerprint, value::Value},
    records::record::Record,
};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::debug;

#[derive(Debug, Default)]
struct Table {
    /// Unique key; inserting an existing key fails.
    key: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    fn key_of(&self, record: &Record) -> Fingerprint {
        record.fingerprint(&self.key)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub selects: u64,
    pub insert_batches: u64,
    pub update_batches: u64,
    pub inserted_rows: u64,
    pub updated_rows: u64,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    stats: Statistics,
    /// Connections that wrote each key, by table.
    writers: HashMap<String, HashMap<Fingerprint, BTreeSet<u64>>>,
    poisoned: Option<(String, Value)>,
}

#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_table(&self, name: &str, key: &[&str]) {
        self.state().tables.insert(
            name.to_string(),
            Table {
                key: key.iter().map(|k| k.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    pub fn seed(&self, name: &str, rows: Vec<Record>) {
        if let Some(table) = self.state().tables.get_mut(name) {
            table.rows.extend(rows);
        }
    }

    pub fn rows(&self, name: &str) -> Vec<Record> {
        self.state()
            .tables
            .get(name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Rows ordered by their key text.
    pub fn sorted_rows(&self, name: &str) -> Vec<Record> {
        let state = self.state();
        let Some(table) = state.tables.get(name) else {
            return Vec::new();
        };
        let mut rows = table.rows.clone();
        rows.sort_by_key(|r| table.key_of(r));
        rows
    }

    pub fn statistics(&self) -> Statistics {
        self.state().stats
    }

    /// Connections that ever wrote each key of `table`.
    pub fn writers(&self, table: &str) -> HashMap<Fingerprint, BTreeSet<u64>> {
        self.state().writers.get(table).cloned().unwrap_or_default()
    }

    /// Makes every write of a row with `column = value` fail.
    pub fn poison(&self, column: &str, value: Value) {
        self.state().poisoned = Some((column.to_string(), value));
    }

    fn select(
        &self,
        table: &str,
        columns: &[String],
        keys: &[String],
        params: &[Value],
    ) -> Result<Vec<Record>, DbError> {
        let mut state = self.state();
        state.stats.selects += 1;
        let table = state
            .tables
            .get(table)
            .ok_or_else(|| missing_table(table))?;

        let wanted: HashSet<Fingerprint> = params
            .chunks(keys.len().max(1))
            .map(|tuple| Fingerprint::from_values(tuple))
            .collect();

        Ok(table
            .rows
            .iter()
            .filter(|row| wanted.contains(&row.fingerprint(keys)))
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.value(c)))
                    .collect()
            })
            .collect())
    }

    fn insert(
        &self,
        connection: u64,
        name: &str,
        columns: &[ColumnSlot],
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError> {
        let mut state = self.state();
        state.stats.insert_batches += 1;
        let State {
            tables,
            stats,
            writers,
            poisoned,
        } = &mut *state;
        let table = tables.get_mut(name).ok_or_else(|| missing_table(name))?;

        let mut applied = 0;
        for params in rows {
            let record = bind(columns, params, &mut params.iter())?;
            check_poison(poisoned, &record)?;

            let key = table.key_of(&record);
            if !table.key.is_empty() && table.rows.iter().any(|r| table.key_of(r) == key) {
                return Err(DbError::Write(format!(
                    "duplicate key value violates unique constraint on {name} ({key})"
                )));
            }
            table.rows.push(record);
            stats.inserted_rows += 1;
            writers
                .entry(name.to_string())
                .or_default()
                .entry(key)
                .or_default()
                .insert(connection);
            applied += 1;
        }
        Ok(applied)
    }

    fn update(
        &self,
        connection: u64,
        name: &str,
        set: &[ColumnSlot],
        keys: &[String],
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError> {
        let mut state = self.state();
        state.stats.update_batches += 1;
        let State {
            tables,
            stats,
            writers,
            poisoned,
        } = &mut *state;
        let table = tables.get_mut(name).ok_or_else(|| missing_table(name))?;

        let mut affected = 0;
        for params in rows {
            let mut values = params.iter();
            let changes = bind(set, params, &mut values)?;
            check_poison(poisoned, &changes)?;
            let key_values: Vec<Value> = values.cloned().collect();
            let key = Fingerprint::from_values(&key_values);

            for row in table.rows.iter_mut().filter(|r| r.fingerprint(keys) == key) {
                for (column, value) in changes.iter() {
                    row.insert(column, value.clone());
                }
                affected += 1;
            }
            stats.updated_rows += 1;
            writers
                .entry(name.to_string())
                .or_default()
                .entry(key)
                .or_default()
                .insert(connection);
        }
        Ok(affected)
    }
}

/// Builds the written image of one parameter row, consuming one parameter
/// per bound slot.
fn bind<'a>(
    slots: &[ColumnSlot],
    params: &[Value],
    values: &mut impl Iterator<Item = &'a Value>,
) -> Result<Record, DbError> {
    let mut record = Record::with_capacity(slots.len());
    for slot in slots {
        let value = match &slot.slot {
            Slot::Param => values.next().cloned().ok_or(DbError::ParameterCount {
                id: 0,
                expected: slots.len(),
                actual: params.len(),
            })?,
            Slot::Sql(sql) => Value::String(sql.clone()),
        };
        record.insert(slot.column.clone(), value);
    }
    Ok(record)
}

fn check_poison(poisoned: &Option<(String, Value)>, record: &Record) -> Result<(), DbError> {
    match poisoned {
        Some((column, value)) if record.get(column).is_some_and(|v| v.matches(value)) => {
            debug!(column = %column, value = %value, "Rejecting poisoned row");
            Err(DbError::Write(format!(
                "value {value} rejected for column {column}"
            )))
        }
        _ => Ok(()),
    }
}

fn missing_table(name: &str) -> DbError {
    DbError::Write(format!("relation \"{name}\" does not exist"))
}

/// One session on a [`MemoryDatabase`].
pub struct MemoryConnection {
    id: u64,
    database: Arc<MemoryDatabase>,
    prepared: Mutex<HashSet<u64>>,
    next_statement: AtomicU64,
}

impl MemoryConnection {
    pub fn new(id: u64, database: Arc<MemoryDatabase>) -> Self {
        MemoryConnection {
            id,
            database,
            prepared: Mutex::new(HashSet::new()),
            next_statement: AtomicU64::new(1),
        }
    }

    fn check_prepared(&self, statement: &PreparedStatement) -> Result<(), DbError> {
        let prepared = self.prepared.lock().unwrap_or_else(|e| e.into_inner());
        if prepared.contains(&statement.id()) {
            Ok(())
        } else {
            Err(DbError::UnknownStatement(statement.id()))
        }
    }
}

#[async_trait]
impl SqlConnection for MemoryConnection {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Other("memory".into())
    }

    fn dialect(&self) -> &dyn Dialect {
        &Postgres
    }

    async fn prepare(&self, statement: Statement) -> Result<PreparedStatement, DbError> {
        let id = self.next_statement.fetch_add(1, Ordering::Relaxed);
        self.prepared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
        Ok(PreparedStatement::new(id, statement))
    }

    async fn query(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
    ) -> Result<Vec<Record>, DbError> {
        self.check_prepared(statement)?;
        match statement.shape() {
            StatementShape::SelectByKeys {
                table,
                columns,
                keys,
                ..
            } => self.database.select(table, columns, keys, params),
            _ => Err(DbError::Write(format!(
                "statement #{} returns no rows",
                statement.id()
            ))),
        }
    }

    async fn execute_batch(
        &self,
        statement: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError> {
        self.check_prepared(statement)?;
        match statement.shape() {
            StatementShape::Insert { table, columns } => {
                self.database.insert(self.id, table, columns, rows)
            }
            StatementShape::Update { table, set, keys } => {
                self.database.update(self.id, table, set, keys, rows)
            }
            StatementShape::SelectByKeys { .. } => Err(DbError::Write(format!(
                "statement #{} is a query",
                statement.id()
            ))),
        }
    }

    async fn release(&self, statement: &PreparedStatement) -> Result<(), DbError> {
        let removed = self
            .prepared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&statement.id());
        if removed {
            Ok(())
        } else {
            Err(DbError::UnknownStatement(statement.id()))
        }
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        self.prepared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

/// Opens numbered sessions on one database.
pub struct MemoryFactory {
    database: Arc<MemoryDatabase>,
    next: AtomicU64,
}

impl MemoryFactory {
    pub fn new(database: Arc<MemoryDatabase>) -> Arc<Self> {
        Arc::new(MemoryFactory {
            database,
            next: AtomicU64::new(0),
        })
    }

    pub fn opened(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    async fn connect(&self) -> Result<Arc<dyn SqlConnection>, ConnectorError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryConnection::new(id, Arc::clone(&self.database))))
    }
}
