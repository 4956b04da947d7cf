//! Per-mode activation and processing metrics.
//!
//! Purely additive counters; consumers poll [`MetricsCollector::snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::mode::{ModeId, clamp_confidence, duration_ms};

/// Confidence is accumulated in millionths to stay lock-free.
const CONFIDENCE_SCALE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    TimedOut,
    ActivationFailed,
}

#[derive(Debug, Default)]
struct ModeCounters {
    activations: AtomicU64,
    deactivations: AtomicU64,
    invocations: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    rejections: AtomicU64,
    active: AtomicU64,
    confidence_samples: AtomicU64,
    confidence_micros: AtomicU64,
    latency_samples: AtomicU64,
    latency_ms: AtomicU64,
}

impl ModeCounters {
    fn snapshot(&self) -> ModeStats {
        let confidence_samples = self.confidence_samples.load(Ordering::Relaxed);
        let latency_samples = self.latency_samples.load(Ordering::Relaxed);

        ModeStats {
            activations: self.activations.load(Ordering::Relaxed),
            deactivations: self.deactivations.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            active_sessions: self.active.load(Ordering::Relaxed),
            avg_confidence: if confidence_samples > 0 {
                self.confidence_micros.load(Ordering::Relaxed) as f64
                    / CONFIDENCE_SCALE
                    / confidence_samples as f64
            } else {
                0.0
            },
            avg_processing_ms: if latency_samples > 0 {
                self.latency_ms.load(Ordering::Relaxed) as f64 / latency_samples as f64
            } else {
                0.0
            },
        }
    }
}

/// Thread-safe per-mode metrics collector.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    modes: RwLock<HashMap<ModeId, Arc<ModeCounters>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, mode_id: &ModeId) -> Arc<ModeCounters> {
        if let Some(c) = self.modes.read().get(mode_id) {
            return Arc::clone(c);
        }
        Arc::clone(self.modes.write().entry(mode_id.clone()).or_default())
    }

    /// Record a finished invocation.
    ///
    /// Timeouts count as errors but contribute no confidence or latency
    /// sample, since their result was discarded.
    pub fn record(
        &self,
        mode_id: &ModeId,
        confidence: f64,
        processing_time: Duration,
        outcome: Outcome,
    ) {
        let c = self.counters(mode_id);
        match outcome {
            Outcome::Success => {
                c.invocations.fetch_add(1, Ordering::Relaxed);
                c.successes.fetch_add(1, Ordering::Relaxed);
                c.confidence_samples.fetch_add(1, Ordering::Relaxed);
                c.confidence_micros.fetch_add(
                    (clamp_confidence(confidence) * CONFIDENCE_SCALE).round() as u64,
                    Ordering::Relaxed,
                );
                c.latency_samples.fetch_add(1, Ordering::Relaxed);
                c.latency_ms
                    .fetch_add(duration_ms(processing_time), Ordering::Relaxed);
            }
            Outcome::Failed => {
                c.invocations.fetch_add(1, Ordering::Relaxed);
                c.errors.fetch_add(1, Ordering::Relaxed);
                c.latency_samples.fetch_add(1, Ordering::Relaxed);
                c.latency_ms
                    .fetch_add(duration_ms(processing_time), Ordering::Relaxed);
            }
            Outcome::TimedOut => {
                c.invocations.fetch_add(1, Ordering::Relaxed);
                c.errors.fetch_add(1, Ordering::Relaxed);
                c.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::ActivationFailed => {
                c.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_rejection(&self, mode_id: &ModeId) {
        self.counters(mode_id)
            .rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn activated(&self, mode_id: &ModeId) {
        let c = self.counters(mode_id);
        c.activations.fetch_add(1, Ordering::Relaxed);
        c.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deactivated(&self, mode_id: &ModeId) {
        let c = self.counters(mode_id);
        c.deactivations.fetch_add(1, Ordering::Relaxed);
        let _ = c
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let modes: BTreeMap<String, ModeStats> = self
            .modes
            .read()
            .iter()
            .map(|(id, c)| (id.to_string(), c.snapshot()))
            .collect();

        let mut totals = Totals::default();
        for stats in modes.values() {
            totals.activations += stats.activations;
            totals.invocations += stats.invocations;
            totals.successes += stats.successes;
            totals.errors += stats.errors;
            totals.timeouts += stats.timeouts;
            totals.rejections += stats.rejections;
            totals.active_sessions += stats.active_sessions;
        }

        MetricsSnapshot { modes, totals }
    }

    pub fn reset(&self) {
        self.modes.write().clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModeStats {
    pub activations: u64,
    pub deactivations: u64,
    pub invocations: u64,
    pub successes: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub active_sessions: u64,
    pub avg_confidence: f64,
    pub avg_processing_ms: f64,
}

impl ModeStats {
    pub fn success_rate(&self) -> f64 {
        if self.invocations > 0 {
            self.successes as f64 / self.invocations as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub activations: u64,
    pub invocations: u64,
    pub successes: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub active_sessions: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub modes: BTreeMap<String, ModeStats>,
    pub totals: Totals,
}

impl MetricsSnapshot {
    pub fn mode(&self, mode_id: &str) -> Option<&ModeStats> {
        self.modes.get(mode_id)
    }

    pub fn summary(&self) -> String {
        format!(
            "Modes: {}, Invocations: {} ({} ok, {} errors, {} timeouts), Rejections: {}, Active: {}",
            self.modes.len(),
            self.totals.invocations,
            self.totals.successes,
            self.totals.errors,
            self.totals.timeouts,
            self.totals.rejections,
            self.totals.active_sessions,
        )
    }
}
