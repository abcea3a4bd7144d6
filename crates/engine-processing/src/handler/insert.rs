use crate::{
    error::HandlerError,
    handler::{HandlerState, RecordHandler, context::HandlerContext},
};
use async_trait::async_trait;
use connectors::sql::base::statement::PreparedStatement;
use engine_core::metrics::{Counter, Timer};
use model::{
    core::{fingerprint::Fingerprint, value::Value},
    records::record::Record,
};
use std::{collections::HashSet, sync::Arc, time::Instant};
use tracing::{debug, error};

/// Batches plain INSERTs.
///
/// With `ignoreDuplicatePK` a record owned by another partition is handed
/// over, and a key already present in the unflushed batch is dropped.
pub struct InsertRecordHandler {
    ctx: Arc<HandlerContext>,
    statement: PreparedStatement,
    pending: Vec<Vec<Value>>,
    seen: HashSet<Fingerprint>,
    suspended: bool,
    state: HandlerState,
}

impl InsertRecordHandler {
    pub async fn new(ctx: Arc<HandlerContext>) -> Result<Self, HandlerError> {
        let statement = ctx.generator().insert(ctx.table(), ctx.insert_slots())?;
        debug!(partition = ctx.partition.id, sql = %statement.sql, "INSERT statement used");
        let statement = ctx.connection.prepare(statement).await?;

        Ok(InsertRecordHandler {
            pending: Vec::with_capacity(ctx.batch_size()),
            seen: HashSet::new(),
            suspended: false,
            state: HandlerState::Accepting,
            statement,
            ctx,
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Buffers one record, flushing when the batch is full and auto-flush is
    /// not suspended.
    pub async fn insert(&mut self, record: Record) -> Result<(), HandlerError> {
        if self.ctx.config.ignore_duplicate_pk {
            let fingerprint = self.ctx.fingerprint(&record)?;
            let Some(record) = self.ctx.claim(&fingerprint, record).await? else {
                return Ok(());
            };
            if self.seen.contains(&fingerprint) {
                debug!(key = %fingerprint, "Duplicate already in batch");
                self.ctx.metrics.increment(Counter::Skipped, 1);
                return Ok(());
            }
            self.push(&record)?;
            self.seen.insert(fingerprint);
        } else {
            self.push(&record)?;
        }

        if !self.suspended && self.pending.len() >= self.ctx.batch_size() {
            self.flush().await?;
        }
        Ok(())
    }

    fn push(&mut self, record: &Record) -> Result<(), HandlerError> {
        let params = self.ctx.insert_params(record)?;
        self.pending.push(params);
        Ok(())
    }

    /// Holds back auto-flush until [`resume`](Self::resume).
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub async fn resume(&mut self) -> Result<(), HandlerError> {
        self.suspended = false;
        if self.pending.len() >= self.ctx.batch_size() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Executes the buffered rows. The buffer and the duplicate tracker are
    /// cleared whether or not the batch succeeds.
    pub async fn flush(&mut self) -> Result<(), HandlerError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending);
        self.seen.clear();
        self.state = HandlerState::Flushing;

        let started = Instant::now();
        let result = self.ctx.connection.execute_batch(&self.statement, &rows).await;
        self.ctx.metrics.observe(Timer::Insert, started.elapsed());
        self.state = HandlerState::Accepting;

        match result {
            Ok(affected) => {
                self.ctx.metrics.increment(Counter::Inserted, rows.len() as u64);
                self.ctx.metrics.increment(Counter::Flushes, 1);
                debug!(
                    partition = self.ctx.partition.id,
                    rows = rows.len(),
                    affected,
                    "INSERT batch flushed"
                );
                Ok(())
            }
            Err(e) => {
                self.ctx.metrics.increment(Counter::Failures, 1);
                error!(
                    partition = self.ctx.partition.id,
                    rows = rows.len(),
                    error = %e,
                    "INSERT batch failed"
                );
                Err(e.into())
            }
        }
    }

    /// Flushes what is left and releases the statement.
    pub async fn finish(&mut self) -> Result<(), HandlerError> {
        if self.state == HandlerState::Closed {
            return Ok(());
        }
        self.suspended = false;
        let flushed = self.flush().await;
        let released = self.ctx.connection.release(&self.statement).await;
        self.state = HandlerState::Closed;
        flushed?;
        released?;
        Ok(())
    }
}

#[async_trait]
impl RecordHandler for InsertRecordHandler {
    async fn handle_record(&mut self, record: Record) -> Result<(), HandlerError> {
        if self.state == HandlerState::Closed {
            return Err(HandlerError::Closed);
        }
        self.insert(record).await
    }

    async fn close(&mut self) -> Result<(), HandlerError> {
        self.finish().await
    }
}
