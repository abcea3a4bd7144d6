use crate::error::ImportError;
use connectors::file::csv::source::RowSource;
use engine_core::metrics::{Counter, Instrumentation};
use engine_processing::{error::MediatorError, mediator::Mediator};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why the reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    Exhausted,
    Limit,
    Cancelled,
    /// Every worker stopped before the input was consumed.
    NoConsumers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub rows: u64,
    pub end: ReadEnd,
}

/// Feeds the mediator from a row source.
///
/// Sources are synchronous, so the loop runs on the blocking pool and waits
/// on the mediator through the runtime handle. The end-of-input token is
/// sent whatever the outcome.
pub struct Reader {
    source: Box<dyn RowSource>,
    mediator: Arc<dyn Mediator>,
    metrics: Arc<dyn Instrumentation>,
    /// Zero reads everything.
    limit: u64,
    cancel: CancellationToken,
}

impl Reader {
    pub fn new(
        source: Box<dyn RowSource>,
        mediator: Arc<dyn Mediator>,
        metrics: Arc<dyn Instrumentation>,
        limit: u64,
        cancel: CancellationToken,
    ) -> Self {
        Reader {
            source,
            mediator,
            metrics,
            limit,
            cancel,
        }
    }

    pub async fn run(self) -> Result<ReadOutcome, ImportError> {
        let mediator = Arc::clone(&self.mediator);
        let handle = Handle::current();
        let read = tokio::task::spawn_blocking(move || self.read_all(&handle)).await;

        match mediator.producer_done().await {
            Ok(()) => debug!("End of input signalled"),
            Err(MediatorError::NoConsumers) => debug!("No consumer left for the end of input"),
            Err(e) => return Err(e.into()),
        }

        read?
    }

    fn read_all(mut self, handle: &Handle) -> Result<ReadOutcome, ImportError> {
        let origin = self.source.describe();
        info!(input = %origin, limit = self.limit, "Reading input");

        let mut rows = 0u64;
        let end = loop {
            if self.cancel.is_cancelled() {
                break ReadEnd::Cancelled;
            }
            if self.limit > 0 && rows >= self.limit {
                break ReadEnd::Limit;
            }
            let Some(row) = self.source.next_row()? else {
                break ReadEnd::Exhausted;
            };

            let sent = handle.block_on(async {
                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    sent = self.mediator.dispatch(row) => Some(sent),
                }
            });
            match sent {
                None => break ReadEnd::Cancelled,
                Some(Ok(())) => {
                    rows += 1;
                    self.metrics.increment(Counter::RowsRead, 1);
                }
                Some(Err(MediatorError::NoConsumers)) => break ReadEnd::NoConsumers,
                Some(Err(e)) => return Err(e.into()),
            }
        };

        match end {
            ReadEnd::Exhausted | ReadEnd::Limit => {
                info!(input = %origin, rows, "Finished reading input")
            }
            ReadEnd::Cancelled => warn!(input = %origin, rows, "Reading cancelled"),
            ReadEnd::NoConsumers => {
                warn!(input = %origin, rows, "All workers stopped, reading abandoned")
            }
        }
        Ok(ReadOutcome { rows, end })
    }
}
