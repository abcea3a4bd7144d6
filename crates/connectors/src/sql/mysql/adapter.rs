use crate::sql::{
    base::{
        connection::{DatabaseKind, SqlConnection, check_parameter_count},
        dialect::{self, Dialect},
        error::{ConnectorError, DbError},
        statement::{PreparedStatement, Statement},
    },
    mysql::{params::MySqlParamStore, row::to_record},
};
use async_trait::async_trait;
use model::{core::value::Value, records::record::Record};
use mysql_async::{Conn, Opts, OptsBuilder, Row, Statement as MySqlStatement, prelude::Queryable};
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tracing::debug;

struct Session {
    conn: Conn,
    statements: HashMap<u64, MySqlStatement>,
}

pub struct MySqlConnection {
    session: Mutex<Option<Session>>,
    dialect: dialect::MySql,
    next_id: AtomicU64,
}

impl MySqlConnection {
    pub async fn connect(
        url: &str,
        properties: &BTreeMap<String, String>,
    ) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let mut builder = OptsBuilder::from_opts(opts);
        if let Some(user) = properties.get("user") {
            builder = builder.user(Some(user.clone()));
        }
        if let Some(password) = properties.get("password") {
            builder = builder.pass(Some(password.clone()));
        }

        let conn = Conn::new(builder).await?;
        Ok(MySqlConnection {
            session: Mutex::new(Some(Session {
                conn,
                statements: HashMap::new(),
            })),
            dialect: dialect::MySql,
            next_id: AtomicU64::new(1),
        })
    }
}

fn native(session: &Session, statement: &PreparedStatement) -> Result<MySqlStatement, DbError> {
    session
        .statements
        .get(&statement.id())
        .cloned()
        .ok_or(DbError::UnknownStatement(statement.id()))
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn prepare(&self, statement: Statement) -> Result<PreparedStatement, DbError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(DbError::Closed)?;

        let native = session.conn.prep(statement.sql.as_str()).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, sql = %statement.sql, "Prepared statement");

        session.statements.insert(id, native);
        Ok(PreparedStatement::new(id, statement))
    }

    async fn query(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
    ) -> Result<Vec<Record>, DbError> {
        check_parameter_count(statement, params)?;
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(DbError::Closed)?;
        let native = native(session, statement)?;

        let rows: Vec<Row> = session
            .conn
            .exec(&native, MySqlParamStore::from_values(params).params())
            .await?;
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
        for row in rows {
            check_parameter_count(statement, row)?;
        }

        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(DbError::Closed)?;
        let native = native(session, statement)?;

        let mut affected = 0;
        for row in rows {
            session
                .conn
                .exec_drop(&native, MySqlParamStore::from_values(row).params())
                .await?;
            affected += session.conn.affected_rows();
        }

        debug!(id = statement.id(), rows = rows.len(), affected, "Executed batch");
        Ok(affected)
    }

    async fn release(&self, statement: &PreparedStatement) -> Result<(), DbError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_mut()
            && let Some(native) = session.statements.remove(&statement.id())
        {
            session.conn.close(native).await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(DbError::Closed)?;
        session.conn.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), DbError> {
        if let Some(session) = self.session.lock().await.take() {
            session.conn.disconnect().await?;
        }
        Ok(())
    }
}
