use crate::SinkObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counts sink traffic. Attach with `Machine::add_observer`.
#[derive(Debug)]
pub struct OutputMetrics {
    write_count: AtomicU64,
    drain_count: AtomicU64,
    overrun_count: AtomicU64,
    start_time: Instant,
}

impl Default for OutputMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputMetrics {
    pub fn new() -> Self {
        Self {
            write_count: AtomicU64::new(0),
            drain_count: AtomicU64::new(0),
            overrun_count: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn reset(&self) {
        self.write_count.store(0, Ordering::SeqCst);
        self.drain_count.store(0, Ordering::SeqCst);
        self.overrun_count.store(0, Ordering::SeqCst);
    }

    pub fn get_writes(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    pub fn get_drains(&self) -> u64 {
        self.drain_count.load(Ordering::SeqCst)
    }

    pub fn get_overruns(&self) -> u64 {
        self.overrun_count.load(Ordering::SeqCst)
    }

    /// Register stores per second of wall time since creation.
    pub fn get_wps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.get_writes() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SinkObserver for OutputMetrics {
    fn on_write(&self, _value: i32) {
        self.write_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_drain(&self, _value: i32) {
        self.drain_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_overrun(&self, _lost: i32) {
        self.overrun_count.fetch_add(1, Ordering::SeqCst);
    }
}
