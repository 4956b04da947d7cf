//! Scriptable mode plugin for engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use modeflow::error::{ModeError, Result};
use modeflow::mode::{ConfidenceScore, ModeConfig, ModeContext, ModePlugin, ModeResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessBehavior {
    Succeed,
    Fail,
    Panic,
}

/// Lifecycle call counts, shared with the test after the plugin is registered.
#[derive(Debug, Default)]
pub struct CallCounters {
    pub activations: AtomicUsize,
    pub deactivations: AtomicUsize,
    pub processed: AtomicUsize,
    pub completed: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl CallCounters {
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the process future is dropped.
struct InFlight<'a>(&'a CallCounters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a CallCounters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockPlugin {
    config: ModeConfig,
    confidence: f64,
    matches: Vec<(String, f64)>,
    process_delay: Duration,
    score_block: Duration,
    process_block: Duration,
    behavior: ProcessBehavior,
    fail_activation: bool,
    fail_deactivation: bool,
    counters: Arc<CallCounters>,
}

impl MockPlugin {
    /// Scores `confidence` for every input.
    pub fn new(id: &str, confidence: f64) -> Self {
        Self {
            config: ModeConfig::new(id, id).with_timeout(Duration::from_secs(5)),
            confidence,
            matches: Vec::new(),
            process_delay: Duration::ZERO,
            score_block: Duration::ZERO,
            process_block: Duration::ZERO,
            behavior: ProcessBehavior::Succeed,
            fail_activation: false,
            fail_deactivation: false,
            counters: Arc::new(CallCounters::default()),
        }
    }

    /// General-purpose fallback scoring 0.3.
    pub fn fallback(id: &str) -> Self {
        let mut plugin = Self::new(id, 0.3);
        plugin.config = plugin.config.as_fallback().with_priority(1);
        plugin
    }

    /// Scores `confidence` when `word` appears in the input, 0.0 otherwise.
    pub fn on_word(mut self, word: &str, confidence: f64) -> Self {
        self.confidence = 0.0;
        self.matches.push((word.to_lowercase(), confidence));
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.config = self.config.with_priority(priority);
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config = self.config.with_max_concurrent_sessions(max);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    pub fn process_delay(mut self, delay: Duration) -> Self {
        self.process_delay = delay;
        self
    }

    /// Blocks the worker thread in `score` instead of yielding.
    pub fn blocking_score(mut self, duration: Duration) -> Self {
        self.score_block = duration;
        self
    }

    /// Blocks the worker thread in `process` instead of yielding.
    pub fn blocking_process(mut self, duration: Duration) -> Self {
        self.process_block = duration;
        self
    }

    pub fn behavior(mut self, behavior: ProcessBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn failing_activation(mut self) -> Self {
        self.fail_activation = true;
        self
    }

    pub fn failing_deactivation(mut self) -> Self {
        self.fail_deactivation = true;
        self
    }

    pub fn counters(&self) -> Arc<CallCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl ModePlugin for MockPlugin {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn score(&self, ctx: &ModeContext) -> Result<ConfidenceScore> {
        if !self.score_block.is_zero() {
            std::thread::sleep(self.score_block);
        }
        let input = ctx.input.to_lowercase();
        let confidence = self
            .matches
            .iter()
            .filter(|(word, _)| input.contains(word.as_str()))
            .map(|(_, c)| *c)
            .fold(self.confidence, f64::max);
        Ok(ConfidenceScore::new(self.config.id.clone(), confidence).with_reason("mock"))
    }

    async fn activate(&self, _ctx: &ModeContext) -> Result<()> {
        if self.fail_activation {
            return Err(ModeError::plugin(self.config.id.as_str(), "cannot start"));
        }
        self.counters.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn process(&self, ctx: &ModeContext) -> Result<ModeResult> {
        let _guard = InFlight::enter(&self.counters);
        self.counters.processed.fetch_add(1, Ordering::SeqCst);

        if !self.process_delay.is_zero() {
            tokio::time::sleep(self.process_delay).await;
        }
        if !self.process_block.is_zero() {
            std::thread::sleep(self.process_block);
        }

        match self.behavior {
            ProcessBehavior::Succeed => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
                Ok(ModeResult::success(json!({
                    "mode": self.config.id,
                    "echo": ctx.input,
                }))
                .with_confidence(0.01))
            }
            ProcessBehavior::Fail => Err(ModeError::plugin(self.config.id.as_str(), "boom")),
            ProcessBehavior::Panic => panic!("process exploded"),
        }
    }

    async fn deactivate(&self, _session_id: &str) -> Result<()> {
        self.counters.deactivations.fetch_add(1, Ordering::SeqCst);
        if self.fail_deactivation {
            return Err(ModeError::plugin(self.config.id.as_str(), "cleanup failed"));
        }
        Ok(())
    }
}
