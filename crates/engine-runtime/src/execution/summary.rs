use engine_core::metrics::MetricsSnapshot;
use std::{fmt, time::Duration};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub partition: usize,
    pub error: String,
}

/// Outcome of importing one input.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub input: String,
    pub partitions: usize,
    pub metrics: MetricsSnapshot,
    pub elapsed: Duration,
    /// Reading stopped early on request.
    pub cancelled: bool,
    pub failures: Vec<WorkerFailure>,
}

impl ImportSummary {
    pub fn applied(&self) -> u64 {
        self.metrics.applied()
    }

    /// Every row was read and every worker finished cleanly.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} in {:.2}s with {} worker(s)",
            self.input,
            self.metrics,
            self.elapsed.as_secs_f64(),
            self.partitions
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        for failure in &self.failures {
            write!(f, "\n  worker {} failed: {}", failure.partition, failure.error)?;
        }
        Ok(())
    }
}
