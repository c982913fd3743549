//! Metrics module - control-cycle timing statistics

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe timing tracker for the fixed-rate loop.
#[derive(Clone)]
pub struct LoopMetrics {
    cycle_hist: Arc<Mutex<Histogram<u64>>>,
    jitter_hist: Arc<Mutex<Histogram<u64>>>,
    last_cycle_ns: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self {
            cycle_hist: Arc::new(Mutex::new(Histogram::new(3).unwrap())),
            jitter_hist: Arc::new(Mutex::new(Histogram::new(3).unwrap())),
            last_cycle_ns: Arc::new(AtomicU64::new(0)),
            overruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record one cycle's working duration, plus the jitter against the
    /// previous cycle.
    pub fn record_cycle(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.cycle_hist.lock().record(nanos).ok();

        let last = self.last_cycle_ns.swap(nanos, Ordering::Relaxed);
        if last > 0 {
            let jitter = nanos.abs_diff(last);
            self.jitter_hist.lock().record(jitter).ok();
        }
    }

    /// A cycle whose work outran the configured period.
    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        let cycle = self.cycle_hist.lock();
        let jitter = self.jitter_hist.lock();

        MetricsReport {
            cycle_p50: Duration::from_nanos(cycle.value_at_quantile(0.5)),
            cycle_p99: Duration::from_nanos(cycle.value_at_quantile(0.99)),
            jitter_p50: Duration::from_nanos(jitter.value_at_quantile(0.5)),
            jitter_p99: Duration::from_nanos(jitter.value_at_quantile(0.99)),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsReport {
    pub cycle_p50: Duration,
    pub cycle_p99: Duration,
    pub jitter_p50: Duration,
    pub jitter_p99: Duration,
    pub overruns: u64,
}
