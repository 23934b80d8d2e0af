//! Statistics tracking for the caching forwarder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic statistics for tracking proxy performance.
pub struct Stats {
    pub requests: AtomicU64,
    pub forwarded: AtomicU64,
    pub cached: AtomicU64,
    pub timed_out: AtomicU64,
    pub malformed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    started: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_forwarded(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn record_cached(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.cached.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    /// A forwarded query abandoned without a reply.
    pub fn record_timed_out(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let cached = self.cached.swap(0, Ordering::Relaxed);
        let timed_out = self.timed_out.swap(0, Ordering::Relaxed);
        let malformed = self.malformed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let answered = forwarded + cached;
        let avg_response_ms = if answered > 0 {
            (total_us as f64 / answered as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            forwarded,
            cached,
            timed_out,
            malformed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub forwarded: u64,
    pub cached: u64,
    pub timed_out: u64,
    pub malformed: u64,
    pub avg_response_ms: f64,
}
