//! Prometheus metrics helpers.
//!
//! Atomic counters and gauges that render in the Prometheus text exposition
//! format. Nothing here registers globally; owners render their own set.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct Series {
    name: String,
    help: String,
    kind: &'static str,
    value: AtomicU64,
}

impl Series {
    fn new(name: String, help: String, kind: &'static str) -> Self {
        Self {
            name,
            help,
            kind,
            value: AtomicU64::new(0),
        }
    }

    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} {}", self.name, self.kind);
        let _ = writeln!(out, "{} {}", self.name, self.get());
        out
    }
}

/// Monotonic counter.
#[derive(Debug)]
pub struct Counter(Series);

impl Counter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name.into(), help.into(), "counter"))
    }

    /// Add one.
    pub fn inc(&self) {
        self.0.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prometheus text block for this counter.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        self.0.render()
    }
}

/// Value that goes up and down, floored at zero.
#[derive(Debug)]
pub struct Gauge(Series);

impl Gauge {
    /// Create a gauge at zero.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self(Series::new(name.into(), help.into(), "gauge"))
    }

    /// Overwrite the value.
    pub fn set(&self, value: u64) {
        self.0.value.store(value, Ordering::Relaxed);
    }

    /// Add one.
    pub fn inc(&self) {
        self.0.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Subtract one unless already zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Prometheus text block for this gauge.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        self.0.render()
    }
}
