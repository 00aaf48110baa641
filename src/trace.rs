//! Kernel trace module
//!
//! Collects wall-clock timings for the observe / forward / backward stages of
//! learnable fake quantization. Disabled by default; the kernels only pay for a
//! relaxed check of the enabled flag.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Stages of a fake quantization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceStep {
    /// Observer statistics update
    Observe,
    /// Fake quantization forward (learnable kernel or fast path)
    Forward,
    /// Gradient computation for input, scale and zero point
    Backward,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single timing measurement.
#[derive(Debug, Clone)]
pub struct TraceMeasurement {
    pub step: TraceStep,
    pub duration: Duration,
    pub metadata: String,
}

/// Thread-safe tracer for collecting timing measurements.
pub struct Tracer {
    measurements: Mutex<Vec<TraceMeasurement>>,
    enabled: AtomicBool,
}

impl Tracer {
    /// Create a new, disabled tracer.
    pub fn new() -> Self {
        Self {
            measurements: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(false),
        }
    }

    /// Enable tracing.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable tracing.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if tracing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Run a closure within a measured span.
    ///
    /// Spans are timed on the caller's stack, so concurrent kernels on
    /// different threads never clobber each other's start times.
    #[inline]
    pub fn span<F, R>(&self, step: TraceStep, metadata: impl Into<String>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.is_enabled() {
            return f();
        }
        let start = Instant::now();
        let result = f();
        self.record(step, start.elapsed(), metadata);
        result
    }

    fn record(&self, step: TraceStep, duration: Duration, metadata: impl Into<String>) {
        let mut measurements = self.measurements.lock().unwrap_or_else(PoisonError::into_inner);
        measurements.push(TraceMeasurement { step, duration, metadata: metadata.into() });
    }

    /// Snapshot of the recorded measurements.
    pub fn measurements(&self) -> Vec<TraceMeasurement> {
        self.measurements.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Clear all measurements.
    pub fn clear(&self) {
        self.measurements.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Generate a per-step summary table.
    pub fn report(&self) -> String {
        let measurements = self.measurements.lock().unwrap_or_else(PoisonError::into_inner);
        if measurements.is_empty() {
            return "No measurements recorded. Enable tracing with TRACER.enable()".to_string();
        }

        let mut totals: HashMap<TraceStep, Duration> = HashMap::new();
        let mut counts: HashMap<TraceStep, usize> = HashMap::new();
        let mut total_time = Duration::ZERO;

        for m in measurements.iter() {
            *totals.entry(m.step).or_default() += m.duration;
            *counts.entry(m.step).or_default() += 1;
            total_time += m.duration;
        }

        let mut output = String::from("Fake quantization trace\n");
        output.push_str(&format!("Total Measured Time: {total_time:.2?}\n"));
        output.push_str("────────────────────────────────────────────────────────────────\n");
        output.push_str(&format!(
            "{:<15} | {:<8} | {:<15} | {:<8}\n",
            "Step", "Count", "Duration", "% Time"
        ));
        output.push_str("────────────────────────────────────────────────────────────────\n");

        let mut sorted_steps: Vec<_> = totals.keys().collect();
        sorted_steps.sort_by(|a, b| totals[b].cmp(&totals[a]));

        for step in sorted_steps {
            let duration = totals[step];
            let count = counts[step];
            let percentage = if total_time.as_nanos() > 0 {
                (duration.as_secs_f64() / total_time.as_secs_f64()) * 100.0
            } else {
                0.0
            };
            output.push_str(&format!(
                "{:<15} | {:<8} | {:<15.2?} | {:>7.2}%\n",
                step.to_string(),
                count,
                duration,
                percentage
            ));
        }
        output
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

/// Global tracer instance.
pub static TRACER: LazyLock<Tracer> = LazyLock::new(Tracer::new);
