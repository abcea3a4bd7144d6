use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    RowsRead,
    Inserted,
    Updated,
    Skipped,
    Rerouted,
    /// Records routed to a partition that had already stopped.
    Lost,
    Flushes,
    Failures,
}

const COUNTERS: usize = 8;
const TIMERS: usize = 3;

impl Counter {
    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    Select,
    Insert,
    Update,
}

impl Timer {
    fn index(self) -> usize {
        self as usize
    }
}

/// Sink for import counters and timings.
pub trait Instrumentation: Send + Sync {
    fn increment(&self, counter: Counter, n: u64);
    fn observe(&self, timer: Timer, elapsed: Duration);
}

#[derive(Debug, Default)]
struct InnerMetrics {
    counters: [AtomicU64; COUNTERS],
    timer_nanos: [AtomicU64; TIMERS],
    timer_calls: [AtomicU64; TIMERS],
}

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub calls: u64,
    pub total: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_read: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub rerouted: u64,
    pub lost: u64,
    pub flushes: u64,
    pub failures: u64,
    pub select: TimerSnapshot,
    pub insert: TimerSnapshot,
    pub update: TimerSnapshot,
}

impl MetricsSnapshot {
    /// Records that reached a terminal outcome.
    pub fn applied(&self) -> u64 {
        self.inserted + self.updated + self.skipped
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} inserted={} updated={} skipped={} rerouted={} lost={} flushes={} failures={}",
            self.rows_read,
            self.inserted,
            self.updated,
            self.skipped,
            self.rerouted,
            self.lost,
            self.flushes,
            self.failures
        )
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.inner.counters[counter.index()].load(Ordering::Relaxed)
    }

    fn timer(&self, timer: Timer) -> TimerSnapshot {
        TimerSnapshot {
            calls: self.inner.timer_calls[timer.index()].load(Ordering::Relaxed),
            total: Duration::from_nanos(self.inner.timer_nanos[timer.index()].load(Ordering::Relaxed)),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_read: self.get(Counter::RowsRead),
            inserted: self.get(Counter::Inserted),
            updated: self.get(Counter::Updated),
            skipped: self.get(Counter::Skipped),
            rerouted: self.get(Counter::Rerouted),
            lost: self.get(Counter::Lost),
            flushes: self.get(Counter::Flushes),
            failures: self.get(Counter::Failures),
            select: self.timer(Timer::Select),
            insert: self.timer(Timer::Insert),
            update: self.timer(Timer::Update),
        }
    }
}

impl Instrumentation for Metrics {
    fn increment(&self, counter: Counter, n: u64) {
        self.inner.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
    }

    fn observe(&self, timer: Timer, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.inner.timer_nanos[timer.index()].fetch_add(nanos, Ordering::Relaxed);
        self.inner.timer_calls[timer.index()].fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
