use crate::error::ImportError;
use connectors::sql::base::connection::SqlConnection;
use engine_config::Configuration;
use engine_core::eval::evaluator::Evaluators;
use engine_processing::{
    handler::RecordHandler,
    mediator::{Mediator, WorkItem},
};
use model::{
    core::value::Value,
    records::{raw::RawRow, record::Record},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One partition's consumer loop. Owns its handler and its connection for
/// the whole run.
pub struct Worker {
    partition: usize,
    mediator: Arc<dyn Mediator>,
    handler: Box<dyn RecordHandler>,
    connection: Arc<dyn SqlConnection>,
    config: Arc<Configuration>,
    evaluators: Arc<Evaluators>,
}

impl Worker {
    pub fn new(
        partition: usize,
        mediator: Arc<dyn Mediator>,
        handler: Box<dyn RecordHandler>,
        connection: Arc<dyn SqlConnection>,
        config: Arc<Configuration>,
        evaluators: Arc<Evaluators>,
    ) -> Self {
        Worker {
            partition,
            mediator,
            handler,
            connection,
            config,
            evaluators,
        }
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Processes items until the mediator says stop. On failure the
    /// partition is given up so the others can still finish. The handler and
    /// the connection are closed in every case.
    pub async fn run(mut self) -> Result<(), ImportError> {
        debug!(partition = self.partition, "Worker started");

        let processed = self.process().await;
        if let Err(e) = &processed {
            error!(partition = self.partition, error = %e, "Worker failed");
            self.mediator.consumer_done(self.partition).await;
        }

        let closed = self.handler.close().await;
        if let Err(e) = self.connection.close().await {
            warn!(partition = self.partition, error = %e, "Failed to close connection");
        }

        processed?;
        closed?;
        info!(partition = self.partition, "Worker finished");
        Ok(())
    }

    async fn process(&mut self) -> Result<(), ImportError> {
        while let Some(item) = self.mediator.take(self.partition).await? {
            match item {
                WorkItem::Row(row) => {
                    let record = map_row(&self.config, &row)?;
                    for record in self.evaluators.map_record(record)? {
                        self.handle(record).await?;
                    }
                }
                WorkItem::Routed(record) => self.handle(record).await?,
            }
        }
        Ok(())
    }

    async fn handle(&mut self, record: Record) -> Result<(), ImportError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            for (column, value) in record.iter() {
                debug!(partition = self.partition, column, value = %value, "Record value");
            }
        }
        self.handler.handle_record(record).await?;
        Ok(())
    }
}

/// Builds a record from the mapped fields of `row`. Every mapped field is
/// kept as text; typing is left to the database.
pub fn map_row(config: &Configuration, row: &RawRow) -> Result<Record, ImportError> {
    let mut record = Record::with_capacity(config.column_mappings.len());
    for (&index, column) in &config.column_mappings {
        let field = row.get(index).ok_or_else(|| ImportError::MissingField {
            position: row.position,
            index,
            column: column.clone(),
        })?;
        record.insert(column.clone(), Value::String(field.to_string()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::OperationMode;
    use std::collections::BTreeMap;

    fn config() -> Configuration {
        Configuration {
            operation_mode: OperationMode::Insert,
            column_mappings: BTreeMap::from([(0, "id".to_string()), (2, "name".to_string())]),
            ..Configuration::default()
        }
    }

    #[test]
    fn maps_fields_by_index() {
        let row = RawRow::new(1, vec!["7".into(), "ignored".into(), "Ada".into()]);
        let record = map_row(&config(), &row).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("id"), Some(&Value::from("7")));
        assert_eq!(record.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn short_rows_are_rejected() {
        let row = RawRow::new(4, vec!["7".into()]);
        let err = map_row(&config(), &row).unwrap_err();
        assert!(matches!(
            err,
            ImportError::MissingField { position: 4, index: 2, ref column } if column == "name"
        ));
    }
}
