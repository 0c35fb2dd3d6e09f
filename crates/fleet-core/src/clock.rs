use crate::model::Timestamp;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of "now", in seconds since the Unix epoch.
pub trait TimeSource {
    fn now(&self) -> Timestamp;
}

/// Wall clock of the local machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Hand-driven clock for tests and replays. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn at(seconds: Timestamp) -> Self {
        let clock = Self::default();
        clock.set(seconds);
        clock
    }

    pub fn set(&self, seconds: Timestamp) {
        self.millis
            .store((seconds * 1000.0).round() as i64, Ordering::Relaxed);
    }

    pub fn advance(&self, seconds: f64) {
        self.millis
            .fetch_add((seconds * 1000.0).round() as i64, Ordering::Relaxed);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.millis.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// Maps local time onto the server's time base.
///
/// The skew is the last reference the server handed us minus the local time
/// at which it arrived. It starts at zero and is reset whenever the stream
/// (re)opens.
#[derive(Debug, Clone)]
pub struct SkewCorrector<C> {
    local: C,
    skew: f64,
}

impl<C: TimeSource> SkewCorrector<C> {
    pub fn new(local: C) -> Self {
        Self { local, skew: 0.0 }
    }

    pub fn set_reference(&mut self, server_now: Timestamp) {
        self.skew = server_now - self.local.now();
        tracing::debug!(event = "clock_reference", skew_secs = self.skew);
    }

    pub fn reset(&mut self) {
        self.skew = 0.0;
    }

    pub fn skew(&self) -> f64 {
        self.skew
    }

    pub fn corrected_now(&self) -> Timestamp {
        self.local.now() + self.skew
    }

    pub fn local(&self) -> &C {
        &self.local
    }
}

impl<C: TimeSource> TimeSource for SkewCorrector<C> {
    fn now(&self) -> Timestamp {
        self.corrected_now()
    }
}
