use crate::{
    error::HandlerError,
    handler::{context::HandlerContext, insert::InsertRecordHandler, insert_update::UpsertWriter},
};
use async_trait::async_trait;
use connectors::sql::base::statement::PreparedStatement;
use engine_core::metrics::{Counter, Timer};
use model::{core::value::Value, records::record::Record};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error};

/// MERGE: new keys go through an embedded insert handler on the same
/// connection, changed rows through one batched UPDATE per cycle.
pub struct MergeWriter {
    ctx: Arc<HandlerContext>,
    inserts: InsertRecordHandler,
    update: PreparedStatement,
    pending_updates: Vec<Vec<Value>>,
}

impl MergeWriter {
    pub async fn new(ctx: Arc<HandlerContext>) -> Result<Self, HandlerError> {
        let statement = ctx.generator().update(
            ctx.table(),
            ctx.update_slots(),
            &ctx.layout.primary_keys,
        )?;
        debug!(partition = ctx.partition.id, sql = %statement.sql, "UPDATE statement used");
        let update = ctx.connection.prepare(statement).await?;
        let inserts = InsertRecordHandler::new(Arc::clone(&ctx)).await?;

        Ok(MergeWriter {
            ctx,
            inserts,
            update,
            pending_updates: Vec::new(),
        })
    }

    async fn flush_updates(&mut self) -> Result<(), HandlerError> {
        if self.pending_updates.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending_updates);

        let started = Instant::now();
        let result = self.ctx.connection.execute_batch(&self.update, &rows).await;
        self.ctx.metrics.observe(Timer::Update, started.elapsed());

        match result {
            Ok(affected) => {
                self.ctx.metrics.increment(Counter::Updated, rows.len() as u64);
                self.ctx.metrics.increment(Counter::Flushes, 1);
                debug!(
                    partition = self.ctx.partition.id,
                    rows = rows.len(),
                    affected,
                    "UPDATE batch flushed"
                );
                Ok(())
            }
            Err(e) => {
                self.ctx.metrics.increment(Counter::Failures, 1);
                error!(
                    partition = self.ctx.partition.id,
                    rows = rows.len(),
                    error = %e,
                    "UPDATE batch failed"
                );
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl UpsertWriter for MergeWriter {
    async fn perform_insert(&mut self, record: Record) -> Result<(), HandlerError> {
        self.inserts.insert(record).await
    }

    async fn perform_update(&mut self, record: Record) -> Result<(), HandlerError> {
        let params = self.ctx.update_params(&record)?;
        self.pending_updates.push(params);
        Ok(())
    }

    fn suspend(&mut self) {
        self.inserts.suspend();
    }

    async fn resume(&mut self) -> Result<(), HandlerError> {
        // updates may target rows inserted by this very cycle
        let inserted = match self.inserts.resume().await {
            Ok(()) => self.inserts.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = inserted {
            self.pending_updates.clear();
            return Err(e);
        }
        self.flush_updates().await
    }

    async fn close(&mut self) -> Result<(), HandlerError> {
        let inserted = self.inserts.finish().await;
        let updated = self.flush_updates().await;
        let released = self.ctx.connection.release(&self.update).await;
        inserted?;
        updated?;
        released?;
        Ok(())
    }
}
