use crate::sql::{
    base::{
        connection::{DatabaseKind, SqlConnection, check_parameter_count},
        dialect::{self, Dialect},
        error::{ConnectorError, DbError},
        statement::{PreparedStatement, Statement},
    },
    postgres::{
        params::PgParamStore,
        row::to_record,
        utils::{connect_client, parse_config},
    },
};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use model::{core::value::Value, records::record::Record};
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tokio_postgres::{Client, Statement as PgStatement};
use tracing::debug;

pub struct PgConnection {
    client: Client,
    dialect: dialect::Postgres,
    statements: Mutex<HashMap<u64, PgStatement>>,
    next_id: AtomicU64,
}

impl PgConnection {
    pub async fn connect(
        url: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<Self, ConnectorError> {
        let config = parse_config(url, properties)?;
        let client = connect_client(config).await?;
        Ok(PgConnection {
            client,
            dialect: dialect::Postgres,
            statements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    async fn native(&self, statement: &PreparedStatement) -> Result<PgStatement, DbError> {
        if self.client.is_closed() {
            return Err(DbError::Closed);
        }
        self.statements
            .lock()
            .await
            .get(&statement.id())
            .cloned()
            .ok_or(DbError::UnknownStatement(statement.id()))
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn prepare(&self, statement: Statement) -> Result<PreparedStatement, DbError> {
        let native = self.client.prepare(&statement.sql).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, sql = %statement.sql, "Prepared statement");

        self.statements.lock().await.insert(id, native);
        Ok(PreparedStatement::new(id, statement))
    }

    async fn query(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
    ) -> Result<Vec<Record>, DbError> {
        check_parameter_count(statement, params)?;
        let native = self.native(statement).await?;

        let bindings = PgParamStore::coerce(params, native.params())?;
        let rows = self.client.query(&native, &bindings.as_refs()).await?;
        Ok(rows.iter().map(to_record).collect())
    }

    async fn execute_batch(
        &self,
        statement: &PreparedStatement,
        rows: &[Vec<Value>],
    ) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let native = self.native(statement).await?;

        let bindings = rows
            .iter()
            .map(|row| {
                check_parameter_count(statement, row)?;
                PgParamStore::coerce(row, native.params())
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        let refs: Vec<_> = bindings.iter().map(PgParamStore::as_refs).collect();

        // Requests issued together are pipelined on the one connection.
        let counts = try_join_all(
            refs.iter()
                .map(|params| self.client.execute(&native, params.as_slice())),
        )
        .await?;

        let affected: u64 = counts.iter().sum();
        debug!(id = statement.id(), rows = rows.len(), affected, "Executed batch");
        Ok(affected)
    }

    async fn release(&self, statement: &PreparedStatement) -> Result<(), DbError> {
        self.statements.lock().await.remove(&statement.id());
        Ok(())
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        self.statements.lock().await.clear();
        Ok(())
    }
}
