use crate::{
    error::HandlerError,
    handler::{context::HandlerContext, insert::InsertRecordHandler, insert_update::UpsertWriter},
};
use async_trait::async_trait;
use engine_core::metrics::Counter;
use model::records::record::Record;
use std::sync::Arc;
use tracing::debug;

/// INSERTONLY: existing rows are left alone.
pub struct InsertOnlyWriter {
    ctx: Arc<HandlerContext>,
    inserts: InsertRecordHandler,
}

impl InsertOnlyWriter {
    pub async fn new(ctx: Arc<HandlerContext>) -> Result<Self, HandlerError> {
        let inserts = InsertRecordHandler::new(Arc::clone(&ctx)).await?;
        Ok(InsertOnlyWriter { ctx, inserts })
    }
}

#[async_trait]
impl UpsertWriter for InsertOnlyWriter {
    async fn perform_insert(&mut self, record: Record) -> Result<(), HandlerError> {
        if self.ctx.config.ignore_null_pk {
            let keys = self.ctx.key_values(&record)?;
            if keys.iter().any(|k| k.is_null()) {
                debug!(record = %record, "Null primary key, insert skipped");
                self.ctx.metrics.increment(Counter::Skipped, 1);
                return Ok(());
            }
        }
        self.inserts.insert(record).await
    }

    async fn perform_update(&mut self, _record: Record) -> Result<(), HandlerError> {
        self.ctx.metrics.increment(Counter::Skipped, 1);
        Ok(())
    }

    fn suspend(&mut self) {
        self.inserts.suspend();
    }

    async fn resume(&mut self) -> Result<(), HandlerError> {
        self.inserts.resume().await?;
        self.inserts.flush().await
    }

    async fn close(&mut self) -> Result<(), HandlerError> {
        self.inserts.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::{RecordHandler, insert_update::InsertUpdateRecordHandler},
        partition::Partitioning,
        test_support::{ScriptedConnection, context_with, people, person},
    };
    use engine_config::{OperationMode, ValueDefinition};
    use engine_core::metrics::Metrics;
    use model::core::value::Value;

    #[tokio::test]
    async fn existing_rows_are_never_updated() {
        let connection = ScriptedConnection::with_rows(vec![person(1, "old")]);
        let metrics = Metrics::new();
        let ctx = context_with(
            people(OperationMode::InsertOnly),
            connection.clone(),
            None,
            Partitioning::single(),
            metrics.clone(),
        )
        .unwrap();
        let ctx = Arc::new(ctx);
        let writer = InsertOnlyWriter::new(Arc::clone(&ctx)).await.unwrap();
        let mut handler = InsertUpdateRecordHandler::new(ctx, writer);

        handler.handle_record(person(1, "new")).await.unwrap();
        handler.handle_record(person(2, "two")).await.unwrap();
        handler.close().await.unwrap();

        assert!(connection.batches("UPDATE").is_empty());
        assert_eq!(
            connection.batches("INSERT"),
            vec![vec![vec![Value::Int(2), Value::from("two")]]]
        );
        assert_eq!(metrics.get(Counter::Skipped), 1);
        assert_eq!(metrics.get(Counter::Inserted), 1);
    }

    #[tokio::test]
    async fn null_keys_are_skipped_without_error() {
        let connection = ScriptedConnection::new();
        let metrics = Metrics::new();
        let mut config = people(OperationMode::InsertOnly);
        config.ignore_null_pk = true;
        config.transform.insert(
            "id".into(),
            ValueDefinition::Function {
                function: "nullIfEmpty".into(),
            },
        );
        let ctx = Arc::new(
            context_with(config, connection.clone(), None, Partitioning::single(), metrics.clone())
                .unwrap(),
        );
        let writer = InsertOnlyWriter::new(Arc::clone(&ctx)).await.unwrap();
        let mut handler = InsertUpdateRecordHandler::new(ctx, writer);

        let blank: Record = [("id", Value::from("  ")), ("name", Value::from("x"))]
            .into_iter()
            .collect();
        handler.handle_record(blank).await.unwrap();
        handler.close().await.unwrap();

        assert!(connection.batches("INSERT").is_empty());
        assert_eq!(metrics.get(Counter::Skipped), 1);
    }
}
