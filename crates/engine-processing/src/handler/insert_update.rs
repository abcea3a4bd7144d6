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
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{debug, warn};

/// What the insert/update handler does with a classified record.
#[async_trait]
pub trait UpsertWriter: Send {
    async fn perform_insert(&mut self, record: Record) -> Result<(), HandlerError>;

    async fn perform_update(&mut self, record: Record) -> Result<(), HandlerError>;

    /// Called before a batch is classified.
    fn suspend(&mut self);

    /// Called once a batch is classified. Writes everything the batch
    /// produced, inserts first.
    async fn resume(&mut self) -> Result<(), HandlerError>;

    async fn close(&mut self) -> Result<(), HandlerError>;
}

struct Buffered {
    fingerprint: Fingerprint,
    keys: Vec<Value>,
    record: Record,
}

/// Buffers records, looks their keys up with one SELECT per batch and
/// classifies each as skip, update or insert.
pub struct InsertUpdateRecordHandler<W: UpsertWriter> {
    ctx: Arc<HandlerContext>,
    writer: W,
    buffer: Vec<Buffered>,
    /// One lookup statement per batch width.
    selects: HashMap<usize, PreparedStatement>,
    select_columns: Vec<String>,
    state: HandlerState,
}

impl<W: UpsertWriter> InsertUpdateRecordHandler<W> {
    pub fn new(ctx: Arc<HandlerContext>, writer: W) -> Self {
        InsertUpdateRecordHandler {
            buffer: Vec::with_capacity(ctx.batch_size()),
            select_columns: ctx.layout.select_columns(),
            selects: HashMap::new(),
            state: HandlerState::Accepting,
            writer,
            ctx,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn cached_selects(&self) -> usize {
        self.selects.len()
    }

    async fn select_statement(&mut self, width: usize) -> Result<PreparedStatement, HandlerError> {
        if let Some(statement) = self.selects.get(&width) {
            return Ok(statement.clone());
        }
        let statement = self.ctx.generator().select_by_keys(
            self.ctx.table(),
            &self.select_columns,
            &self.ctx.layout.primary_keys,
            width,
        )?;
        debug!(partition = self.ctx.partition.id, width, sql = %statement.sql, "SELECT statement used");
        let prepared = self.ctx.connection.prepare(statement).await?;
        self.selects.insert(width, prepared.clone());
        Ok(prepared)
    }

    /// Existing rows for the buffered keys, by the fingerprint of the buffered
    /// key they matched. Fetched keys come back typed, so they are compared
    /// with the buffered values rather than re-hashed.
    async fn lookup(
        &mut self,
        batch: &[Buffered],
    ) -> Result<HashMap<Fingerprint, Record>, HandlerError> {
        let statement = self.select_statement(batch.len()).await?;
        let params: Vec<Value> = batch.iter().flat_map(|b| b.keys.iter().cloned()).collect();

        let started = Instant::now();
        let rows = self.ctx.connection.query(&statement, &params).await;
        self.ctx.metrics.observe(Timer::Select, started.elapsed());
        let rows = rows.inspect_err(|_| self.ctx.metrics.increment(Counter::Failures, 1))?;

        let keys = &self.ctx.layout.primary_keys;
        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            let mut matched = false;
            for buffered in batch.iter().filter(|b| matches_key(&row, keys, &b.keys)) {
                matched = true;
                found
                    .entry(buffered.fingerprint.clone())
                    .or_insert_with(|| row.clone());
            }
            if !matched {
                warn!(partition = self.ctx.partition.id, row = %row, "Fetched row matches no buffered key");
            }
        }
        Ok(found)
    }

    async fn classify(
        &mut self,
        batch: Vec<Buffered>,
        mut found: HashMap<Fingerprint, Record>,
    ) -> Result<(), HandlerError> {
        for Buffered {
            fingerprint,
            record,
            ..
        } in batch
        {
            let image = self.ctx.row_image(&record)?;
            match found.get(&fingerprint) {
                Some(existing) => {
                    if !self.ctx.config.force_update && !self.ctx.differs(existing, &record)? {
                        debug!(key = %fingerprint, "Unchanged, skipping");
                        self.ctx.metrics.increment(Counter::Skipped, 1);
                        continue;
                    }
                    self.writer.perform_update(record).await?;
                }
                None => self.writer.perform_insert(record).await?,
            }
            // later records of this batch compare against what this one wrote
            found.insert(fingerprint, image);
        }
        Ok(())
    }

    /// Runs one select, classify and write cycle over the buffer. The buffer
    /// is empty afterwards whatever the outcome.
    pub async fn execute_batch(&mut self) -> Result<(), HandlerError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.state = HandlerState::Flushing;

        let result = match self.lookup(&batch).await {
            Ok(found) => {
                self.writer.suspend();
                let classified = self.classify(batch, found).await;
                let written = self.writer.resume().await;
                classified.and(written)
            }
            Err(e) => Err(e),
        };

        self.state = HandlerState::Accepting;
        result
    }
}

fn matches_key(row: &Record, keys: &[String], values: &[Value]) -> bool {
    keys.len() == values.len()
        && keys
            .iter()
            .zip(values)
            .all(|(key, value)| row.value(key).matches(value))
}

#[async_trait]
impl<W: UpsertWriter> RecordHandler for InsertUpdateRecordHandler<W> {
    async fn handle_record(&mut self, record: Record) -> Result<(), HandlerError> {
        if self.state == HandlerState::Closed {
            return Err(HandlerError::Closed);
        }

        let keys = self.ctx.key_values(&record)?;
        let fingerprint = Fingerprint::from_values(&keys);
        let Some(record) = self.ctx.claim(&fingerprint, record).await? else {
            return Ok(());
        };

        self.buffer.push(Buffered {
            fingerprint,
            keys,
            record,
        });
        if self.buffer.len() >= self.ctx.batch_size() {
            self.execute_batch().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), HandlerError> {
        if self.state == HandlerState::Closed {
            return Ok(());
        }

        let flushed = self.execute_batch().await;
        let closed = self.writer.close().await;

        let mut released = Ok(());
        for (_, statement) in self.selects.drain() {
            if let Err(e) = self.ctx.connection.release(&statement).await {
                warn!(error = %e, "Failed to release SELECT statement");
                released = Err(e);
            }
        }
        self.state = HandlerState::Closed;

        flushed?;
        closed?;
        released?;
        if !self.buffer.is_empty() {
            return Err(HandlerError::Unflushed(self.buffer.len()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::merge::MergeWriter,
        partition::Partitioning,
        test_support::{ScriptedConnection, context, people, person},
    };
    use engine_config::OperationMode;
    use std::sync::atomic::Ordering;

    async fn merge_handler(
        connection: Arc<ScriptedConnection>,
        batch_size: i64,
    ) -> InsertUpdateRecordHandler<MergeWriter> {
        let mut config = people(OperationMode::Merge);
        config.batch_size = batch_size;
        let ctx = Arc::new(context(config, connection, None, Partitioning::single()).unwrap());
        let writer = MergeWriter::new(Arc::clone(&ctx)).await.unwrap();
        InsertUpdateRecordHandler::new(ctx, writer)
    }

    #[tokio::test]
    async fn selects_once_per_batch_and_caches_by_width() {
        let connection = ScriptedConnection::new();
        let mut handler = merge_handler(connection.clone(), 3).await;

        for id in 1..=7 {
            handler.handle_record(person(id, "x")).await.unwrap();
        }
        assert_eq!(connection.selects.load(Ordering::Relaxed), 2);
        assert_eq!(handler.buffered(), 1);

        handler.close().await.unwrap();
        assert_eq!(connection.selects.load(Ordering::Relaxed), 3);
        // widths 3 and 1
        assert_eq!(connection.released.load(Ordering::Relaxed), 2 + 2);
    }

    #[tokio::test]
    async fn unchanged_rows_are_skipped_and_changed_rows_updated() {
        let connection =
            ScriptedConnection::with_rows(vec![person(1, "same"), person(2, "old")]);
        let mut handler = merge_handler(connection.clone(), 10).await;

        handler.handle_record(person(1, "same")).await.unwrap();
        handler.handle_record(person(2, "new")).await.unwrap();
        handler.handle_record(person(3, "fresh")).await.unwrap();
        handler.close().await.unwrap();

        assert_eq!(
            connection.batches("UPDATE"),
            vec![vec![vec![Value::Int(2), Value::from("new"), Value::Int(2)]]]
        );
        assert_eq!(
            connection.batches("INSERT"),
            vec![vec![vec![Value::Int(3), Value::from("fresh")]]]
        );
    }

    #[tokio::test]
    async fn typed_keys_read_back_match_their_csv_text() {
        let scaled: Record = [
            ("id", Value::Decimal("1.50".parse().unwrap())),
            ("name", Value::from("same")),
        ]
        .into_iter()
        .collect();
        let connection = ScriptedConnection::with_rows(vec![scaled, person(7, "old")]);
        let mut handler = merge_handler(connection.clone(), 10).await;

        let text = |id: &str, name: &str| -> Record {
            [("id", Value::from(id)), ("name", Value::from(name))]
                .into_iter()
                .collect()
        };
        handler.handle_record(text("1.50", "same")).await.unwrap();
        handler.handle_record(text("007", "new")).await.unwrap();
        handler.close().await.unwrap();

        assert!(connection.batches("INSERT").is_empty());
        assert_eq!(
            connection.batches("UPDATE"),
            vec![vec![vec![Value::from("007"), Value::from("new"), Value::from("007")]]]
        );
    }

    #[tokio::test]
    async fn force_update_rewrites_unchanged_rows() {
        let connection = ScriptedConnection::with_rows(vec![person(1, "same")]);
        let mut config = people(OperationMode::Merge);
        config.force_update = true;
        let ctx = Arc::new(context(config, connection.clone(), None, Partitioning::single()).unwrap());
        let writer = MergeWriter::new(Arc::clone(&ctx)).await.unwrap();
        let mut handler = InsertUpdateRecordHandler::new(ctx, writer);

        handler.handle_record(person(1, "same")).await.unwrap();
        handler.close().await.unwrap();

        assert_eq!(connection.batches("UPDATE").len(), 1);
    }

    #[tokio::test]
    async fn same_key_twice_in_one_batch_inserts_then_updates() {
        let connection = ScriptedConnection::new();
        let mut handler = merge_handler(connection.clone(), 10).await;

        handler.handle_record(person(1, "A")).await.unwrap();
        handler.handle_record(person(1, "B")).await.unwrap();
        handler.close().await.unwrap();

        let executed = connection.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].0.starts_with("INSERT"));
        assert_eq!(executed[0].1, vec![vec![Value::Int(1), Value::from("A")]]);
        assert!(executed[1].0.starts_with("UPDATE"));
        assert_eq!(
            executed[1].1,
            vec![vec![Value::Int(1), Value::from("B"), Value::Int(1)]]
        );
    }

    #[tokio::test]
    async fn repeated_identical_record_is_skipped_after_insert() {
        let connection = ScriptedConnection::new();
        let mut handler = merge_handler(connection.clone(), 10).await;

        handler.handle_record(person(1, "A")).await.unwrap();
        handler.handle_record(person(1, "A")).await.unwrap();
        handler.close().await.unwrap();

        assert_eq!(connection.batches("INSERT")[0].len(), 1);
        assert!(connection.batches("UPDATE").is_empty());
    }

    #[tokio::test]
    async fn failed_cycle_still_empties_the_buffer() {
        let connection = ScriptedConnection::new();
        let mut handler = merge_handler(connection.clone(), 2).await;
        *connection.fail_writes.lock().unwrap() = true;

        handler.handle_record(person(1, "A")).await.unwrap();
        let result = handler.handle_record(person(2, "B")).await;
        assert!(matches!(result, Err(HandlerError::Db(_))));
        assert_eq!(handler.buffered(), 0);

        *connection.fail_writes.lock().unwrap() = false;
        handler.close().await.unwrap();
        assert!(connection.batches("INSERT").is_empty());
    }
}
