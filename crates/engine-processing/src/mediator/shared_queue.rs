use crate::{
    error::MediatorError,
    mediator::{
        Mediator, Router, WorkItem,
        termination::{Phase, SharedTokenAction, TerminationState},
    },
};
use async_trait::async_trait;
use engine_config::Configuration;
use engine_core::metrics::{Counter, Instrumentation};
use model::records::{raw::RawRow, record::Record};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

#[derive(Debug)]
enum SharedMessage {
    Row(RawRow),
    Token,
}

#[derive(Debug)]
enum RoutedMessage {
    Record(Record),
    Token,
}

/// Private queue of one partition. Only its owner ever locks it.
struct Inbox {
    rx: mpsc::Receiver<RoutedMessage>,
    /// Messages pulled off `rx` while the owner was blocked routing elsewhere.
    stash: VecDeque<RoutedMessage>,
    termination: TerminationState,
}

impl Inbox {
    async fn next(&mut self) -> Option<RoutedMessage> {
        if let Some(message) = self.stash.pop_front() {
            return Some(message);
        }
        self.rx.recv().await
    }

    /// Closes the queue and drops whatever is left in it, returning the
    /// number of records dropped.
    fn discard(&mut self) -> u64 {
        self.rx.close();
        let mut lost = 0;
        let stashed = std::mem::take(&mut self.stash);
        for message in stashed {
            if matches!(message, RoutedMessage::Record(_)) {
                lost += 1;
            }
        }
        while let Ok(message) = self.rx.try_recv() {
            if matches!(message, RoutedMessage::Record(_)) {
                lost += 1;
            }
        }
        lost
    }
}

struct PartitionQueue {
    tx: mpsc::Sender<RoutedMessage>,
    inbox: Mutex<Inbox>,
}

enum Next {
    Routed(Option<RoutedMessage>),
    Shared(Option<SharedMessage>),
}

/// Bounded shared queue between the reader and the workers, plus one bounded
/// private queue per partition when routing is on.
///
/// End of input travels as a token through the shared queue. Each partition
/// that sees it puts it back for the next one and, with routing on, sends a
/// token to every other partition's private queue. A partition stops once it
/// has counted a token from every partition, itself included.
pub struct SharedQueueMediator {
    shared_tx: mpsc::Sender<SharedMessage>,
    shared_rx: Mutex<mpsc::Receiver<SharedMessage>>,
    queues: Vec<PartitionQueue>,
    routing: bool,
    active: AtomicUsize,
    metrics: Arc<dyn Instrumentation>,
}

impl SharedQueueMediator {
    pub fn new(
        capacity: usize,
        partitions: usize,
        routing: bool,
        metrics: Arc<dyn Instrumentation>,
    ) -> Self {
        let partitions = partitions.max(1);
        let capacity = capacity.max(1);
        let (shared_tx, shared_rx) = mpsc::channel(capacity);

        let queues = (0..partitions)
            .map(|_| {
                let (tx, rx) = mpsc::channel(capacity);
                PartitionQueue {
                    tx,
                    inbox: Mutex::new(Inbox {
                        rx,
                        stash: VecDeque::new(),
                        termination: TerminationState::new(partitions),
                    }),
                }
            })
            .collect();

        debug!(partitions, capacity, routing, "Mediator created");

        SharedQueueMediator {
            shared_tx,
            shared_rx: Mutex::new(shared_rx),
            queues,
            routing,
            active: AtomicUsize::new(partitions),
            metrics,
        }
    }

    /// Queues hold `batchSize × partitions` items each. Routing follows
    /// `ignoreDuplicatePK`.
    pub fn for_config(
        config: &Configuration,
        partitions: usize,
        metrics: Arc<dyn Instrumentation>,
    ) -> Self {
        let capacity = config
            .effective_batch_size()
            .saturating_mul(partitions.max(1));
        Self::new(capacity, partitions, config.ignore_duplicate_pk, metrics)
    }

    pub fn routing_enabled(&self) -> bool {
        self.routing
    }

    fn queue(&self, partition: usize) -> Result<&PartitionQueue, MediatorError> {
        self.queues
            .get(partition)
            .ok_or(MediatorError::UnknownPartition {
                partition,
                partitions: self.queues.len(),
            })
    }

    async fn recv_shared(&self) -> Option<SharedMessage> {
        self.shared_rx.lock().await.recv().await
    }

    async fn on_shared_token(&self, partition: usize, inbox: &mut Inbox) {
        // Put the token back for the partitions that have not seen it yet.
        if self.shared_tx.send(SharedMessage::Token).await.is_err() {
            debug!(partition, "Shared queue closed, token not passed on");
        }

        if !self.routing {
            inbox.termination.finish();
            return;
        }

        if inbox.termination.on_shared_token() == SharedTokenAction::Broadcast {
            self.broadcast(partition, inbox).await;
        }
    }

    /// Tells every other partition that `partition` routes nothing more.
    async fn broadcast(&self, partition: usize, inbox: &mut Inbox) {
        for (target, queue) in self.queues.iter().enumerate() {
            if target == partition {
                continue;
            }
            if send_draining(inbox, &queue.tx, RoutedMessage::Token)
                .await
                .is_err()
            {
                debug!(partition, target, "Partition already stopped, token dropped");
            }
        }
        debug!(partition, "End of routing announced");
    }

    async fn retire(&self, partition: usize) {
        debug!(partition, "Partition finished");
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Nobody reads the shared queue anymore; fail the reader instead
            // of letting it wait forever.
            self.shared_rx.lock().await.close();
        }
    }
}

/// Sends `message` while moving anything that arrives on the sender's own
/// private queue into its stash. Two partitions routing to each other can
/// then never block on each other's full queue.
async fn send_draining(
    inbox: &mut Inbox,
    tx: &mpsc::Sender<RoutedMessage>,
    message: RoutedMessage,
) -> Result<(), RoutedMessage> {
    let send = tx.send(message);
    tokio::pin!(send);
    loop {
        tokio::select! {
            biased;
            sent = &mut send => return sent.map_err(|e| e.0),
            Some(message) = inbox.rx.recv() => inbox.stash.push_back(message),
        }
    }
}

#[async_trait]
impl Router for SharedQueueMediator {
    fn partitions(&self) -> usize {
        self.queues.len()
    }

    async fn dispatch_to(
        &self,
        from: usize,
        record: Record,
        target: usize,
    ) -> Result<(), MediatorError> {
        if !self.routing {
            return Err(MediatorError::RoutingDisabled);
        }
        let destination = self.queue(target)?;
        let mut inbox = self.queue(from)?.inbox.lock().await;

        if from == target {
            inbox.stash.push_back(RoutedMessage::Record(record));
            return Ok(());
        }

        match send_draining(&mut inbox, &destination.tx, RoutedMessage::Record(record)).await {
            Ok(()) => self.metrics.increment(Counter::Rerouted, 1),
            Err(_) => {
                self.metrics.increment(Counter::Lost, 1);
                warn!(from, target, "Owning partition has stopped, record lost");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Mediator for SharedQueueMediator {
    async fn dispatch(&self, row: RawRow) -> Result<(), MediatorError> {
        self.shared_tx
            .send(SharedMessage::Row(row))
            .await
            .map_err(|_| MediatorError::NoConsumers)
    }

    async fn producer_done(&self) -> Result<(), MediatorError> {
        self.shared_tx
            .send(SharedMessage::Token)
            .await
            .map_err(|_| MediatorError::NoConsumers)
    }

    async fn take(&self, partition: usize) -> Result<Option<WorkItem>, MediatorError> {
        let queue = self.queue(partition)?;
        let mut inbox = queue.inbox.lock().await;

        loop {
            let next = match inbox.termination.phase() {
                Phase::Finished => return Ok(None),
                Phase::Draining => Next::Routed(inbox.next().await),
                Phase::Intake => {
                    if let Some(message) = inbox.stash.pop_front() {
                        Next::Routed(Some(message))
                    } else if self.routing {
                        tokio::select! {
                            biased;
                            routed = inbox.rx.recv() => Next::Routed(routed),
                            shared = self.recv_shared() => Next::Shared(shared),
                        }
                    } else {
                        Next::Shared(self.recv_shared().await)
                    }
                }
            };

            match next {
                Next::Routed(Some(RoutedMessage::Record(record))) => {
                    return Ok(Some(WorkItem::Routed(record)));
                }
                Next::Routed(Some(RoutedMessage::Token)) => {
                    inbox.termination.on_router_token();
                }
                Next::Shared(Some(SharedMessage::Row(row))) => {
                    return Ok(Some(WorkItem::Row(row)));
                }
                Next::Shared(Some(SharedMessage::Token)) => {
                    self.on_shared_token(partition, &mut inbox).await;
                }
                Next::Routed(None) | Next::Shared(None) => inbox.termination.finish(),
            }

            if inbox.termination.is_finished() {
                let lost = inbox.discard();
                if lost > 0 {
                    self.metrics.increment(Counter::Lost, lost);
                    warn!(partition, lost, "Records left behind on a finished partition");
                }
                drop(inbox);
                self.retire(partition).await;
                return Ok(None);
            }
        }
    }

    async fn consumer_done(&self, partition: usize) {
        let Ok(queue) = self.queue(partition) else {
            return;
        };
        let mut inbox = queue.inbox.lock().await;
        if inbox.termination.is_finished() {
            return;
        }

        let must_broadcast = inbox.termination.on_consumer_done();
        let lost = inbox.discard();
        if lost > 0 {
            self.metrics.increment(Counter::Lost, lost);
        }
        warn!(partition, lost, "Consumer stopped before the end of input");

        if self.routing && must_broadcast {
            self.broadcast(partition, &mut inbox).await;
        }
        drop(inbox);
        self.retire(partition).await;
    }
}
