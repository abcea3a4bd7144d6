/// Where a partition stands in the shutdown protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Taking rows from the shared queue and routed records from the private one.
    Intake,
    /// The shared queue is exhausted; only routed records are accepted until
    /// every partition has reported.
    Draining,
    Finished,
}

/// What the partition must do after seeing the shared end-of-input token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedTokenAction {
    /// Tell every other partition that this one routes no more records.
    Broadcast,
    Ignore,
}

/// Dead-producer counting for one partition.
///
/// Every partition is a producer for the private queues of the others. A
/// partition may only finish once it knows that all `partitions` producers
/// (itself included) are done routing to it.
#[derive(Debug, Clone)]
pub struct TerminationState {
    partitions: usize,
    dead_producers: usize,
    phase: Phase,
}

impl TerminationState {
    pub fn new(partitions: usize) -> Self {
        TerminationState {
            partitions: partitions.max(1),
            dead_producers: 0,
            phase: Phase::Intake,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn dead_producers(&self) -> usize {
        self.dead_producers
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Another partition announced it routes nothing more to this one.
    pub fn on_router_token(&mut self) -> Phase {
        if self.phase == Phase::Finished {
            return self.phase;
        }
        self.dead_producers += 1;
        if self.phase == Phase::Draining {
            self.settle();
        }
        self.phase
    }

    /// The shared queue delivered the end-of-input token.
    pub fn on_shared_token(&mut self) -> SharedTokenAction {
        if self.phase != Phase::Intake {
            return SharedTokenAction::Ignore;
        }
        self.dead_producers += 1;
        self.phase = Phase::Draining;
        self.settle();
        SharedTokenAction::Broadcast
    }

    /// The consumer stopped on its own. Returns whether the others still have
    /// to be told, which is the case unless it already broadcast.
    pub fn on_consumer_done(&mut self) -> bool {
        let must_broadcast = self.phase == Phase::Intake;
        self.phase = Phase::Finished;
        must_broadcast
    }

    /// The private queue is gone; nothing more can arrive.
    pub fn finish(&mut self) {
        self.phase = Phase::Finished;
    }

    fn settle(&mut self) {
        if self.dead_producers >= self.partitions {
            self.phase = Phase::Finished;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_token_broadcasts_once_and_starts_draining() {
        let mut state = TerminationState::new(3);

        assert_eq!(state.on_shared_token(), SharedTokenAction::Broadcast);
        assert_eq!(state.phase(), Phase::Draining);
        assert_eq!(state.dead_producers(), 1);

        assert_eq!(state.on_shared_token(), SharedTokenAction::Ignore);
        assert_eq!(state.dead_producers(), 1);
    }

    #[test]
    fn draining_finishes_when_every_producer_reported() {
        let mut state = TerminationState::new(3);
        state.on_shared_token();

        assert_eq!(state.on_router_token(), Phase::Draining);
        assert_eq!(state.on_router_token(), Phase::Finished);
        assert!(state.is_finished());

        // late tokens are ignored
        assert_eq!(state.on_router_token(), Phase::Finished);
        assert_eq!(state.dead_producers(), 3);
    }

    #[test]
    fn router_tokens_seen_during_intake_are_counted() {
        let mut state = TerminationState::new(3);
        assert_eq!(state.on_router_token(), Phase::Intake);
        assert_eq!(state.on_router_token(), Phase::Intake);

        // every other partition already reported, so the shared token ends it
        assert_eq!(state.on_shared_token(), SharedTokenAction::Broadcast);
        assert_eq!(state.phase(), Phase::Finished);
    }

    #[test]
    fn single_partition_finishes_on_the_shared_token() {
        let mut state = TerminationState::new(1);
        assert_eq!(state.on_shared_token(), SharedTokenAction::Broadcast);
        assert!(state.is_finished());
    }

    #[test]
    fn consumer_done_broadcasts_only_from_intake() {
        let mut failed_early = TerminationState::new(2);
        assert!(failed_early.on_consumer_done());
        assert!(failed_early.is_finished());

        let mut failed_draining = TerminationState::new(2);
        failed_draining.on_shared_token();
        assert!(!failed_draining.on_consumer_done());
        assert!(failed_draining.is_finished());
    }
}
