use crate::error::MediatorError;
use async_trait::async_trait;
use model::records::{raw::RawRow, record::Record};

pub mod shared_queue;
pub mod termination;

/// A unit of work handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    /// A row from the input, still to be mapped.
    Row(RawRow),
    /// A record another partition mapped and handed over to its owner.
    Routed(Record),
}

/// Hands records to the partition that owns them.
#[async_trait]
pub trait Router: Send + Sync {
    fn partitions(&self) -> usize;

    /// Queues `record` on the private queue of `target`. Waits while that
    /// queue is full.
    async fn dispatch_to(
        &self,
        from: usize,
        record: Record,
        target: usize,
    ) -> Result<(), MediatorError>;
}

/// The hand-off between the reader and the workers.
#[async_trait]
pub trait Mediator: Router {
    /// Queues one input row. Waits while the shared queue is full.
    async fn dispatch(&self, row: RawRow) -> Result<(), MediatorError>;

    /// Marks the end of input. Called exactly once by the reader.
    async fn producer_done(&self) -> Result<(), MediatorError>;

    /// Next item for `partition`, or `None` once the partition may stop.
    async fn take(&self, partition: usize) -> Result<Option<WorkItem>, MediatorError>;

    /// The consumer of `partition` stopped without being told to.
    async fn consumer_done(&self, partition: usize);
}
