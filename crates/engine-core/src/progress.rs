use crate::metrics::Metrics;
use std::{
    fmt,
    time::{Duration, Instant},
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Reading,
    Done,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Reading => "Reading",
            ProgressStage::Done => "Done",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periodically logs how far an import has come.
pub struct ProgressReporter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(label: String, metrics: Metrics, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => report(&label, &metrics, started, ProgressStage::Reading),
                }
            }
            report(&label, &metrics, started, ProgressStage::Done);
        }
        .in_current_span());

        ProgressReporter { cancel, handle }
    }

    /// Stops the reporter after one final line.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

fn report(label: &str, metrics: &Metrics, started: Instant, stage: ProgressStage) {
    let snapshot = metrics.snapshot();
    let elapsed = started.elapsed();
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        snapshot.rows_read as f64 / secs
    } else {
        0.0
    };
    info!(
        input = label,
        stage = %stage,
        rows_read = snapshot.rows_read,
        inserted = snapshot.inserted,
        updated = snapshot.updated,
        skipped = snapshot.skipped,
        rows_per_sec = format!("{rate:.1}"),
        elapsed_ms = elapsed.as_millis() as u64,
        "Import progress"
    );
}
