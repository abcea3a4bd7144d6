use crate::{
    error::HandlerError,
    handler::{
        context::HandlerContext, insert::InsertRecordHandler, insert_only::InsertOnlyWriter,
        insert_update::InsertUpdateRecordHandler, merge::MergeWriter,
    },
};
use async_trait::async_trait;
use engine_config::OperationMode;
use model::records::record::Record;
use std::sync::Arc;
use tracing::info;

pub mod context;
pub mod insert;
pub mod insert_only;
pub mod insert_update;
pub mod merge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Accepting,
    Flushing,
    Closed,
}

/// Applies mapped records to the target table.
#[async_trait]
pub trait RecordHandler: Send {
    /// May buffer, flush or hand the record over to another partition.
    async fn handle_record(&mut self, record: Record) -> Result<(), HandlerError>;

    /// Flushes anything buffered and releases the statements. Closing twice
    /// is a no-op.
    async fn close(&mut self) -> Result<(), HandlerError>;
}

pub async fn create_handler(
    ctx: Arc<HandlerContext>,
) -> Result<Box<dyn RecordHandler>, HandlerError> {
    let mode = ctx.config.operation_mode;
    if mode.requires_primary_keys() && ctx.layout.primary_keys.is_empty() {
        return Err(HandlerError::MissingPrimaryKeys(mode));
    }

    info!(
        partition = ctx.partition.id,
        mode = %mode,
        table = ctx.table(),
        "Creating record handler"
    );

    let handler: Box<dyn RecordHandler> = match mode {
        OperationMode::Insert => Box::new(InsertRecordHandler::new(ctx).await?),
        OperationMode::Merge => {
            let writer = MergeWriter::new(Arc::clone(&ctx)).await?;
            Box::new(InsertUpdateRecordHandler::new(ctx, writer))
        }
        OperationMode::InsertOnly => {
            let writer = InsertOnlyWriter::new(Arc::clone(&ctx)).await?;
            Box::new(InsertUpdateRecordHandler::new(ctx, writer))
        }
    };
    Ok(handler)
}
