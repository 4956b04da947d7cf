use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::builder::ModeEngineBuilder;
use super::state::EngineState;
use crate::config::EngineConfig;
use crate::error::{FailureKind, ModeFailure, Result};
use crate::events::{
    AnalyticsEvent, AnalyticsEventType, AnalyticsReceiver, DisplayReceiver, DisplayUpdate,
    EngineEvent, EventBus, EventReceiver,
};
use crate::metrics::{MetricsCollector, MetricsSnapshot, Outcome};
use crate::mode::{ModeContext, ModeId, ModeResult, SharedPlugin, duration_ms};
use crate::registry::ModeRegistry;
use crate::router::{ConfidenceRouter, RoutingDecision};
use crate::session::{
    AcquireResult, DenyReason, ModeHistoryEntry, SessionManager, SessionState, TimeoutOutcome,
};

/// How a guarded plugin call ended.
enum PluginCall<T> {
    Returned(T),
    Failed(String),
    Panicked,
    TimedOut(Duration),
}

impl<T> PluginCall<T> {
    fn describe(&self, stage: &str) -> String {
        match self {
            Self::Returned(_) => format!("{} succeeded", stage),
            Self::Failed(message) => format!("{} failed: {}", stage, message),
            Self::Panicked => format!("{} panicked", stage),
            Self::TimedOut(after) => format!("{} timed out after {}ms", stage, after.as_millis()),
        }
    }
}

#[derive(Debug, Default)]
struct SessionView {
    active_mode: Option<ModeId>,
    history: VecDeque<ModeHistoryEntry>,
    state: EngineState,
    last_used: Option<Instant>,
}

/// Per caller session: `turn` serializes whole submits, `view` is what
/// readers see between turns.
struct SessionSlot {
    turn: Mutex<()>,
    view: RwLock<SessionView>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            turn: Mutex::new(()),
            view: RwLock::new(SessionView::default()),
        }
    }

    fn active_mode(&self) -> Option<ModeId> {
        self.view.read().active_mode.clone()
    }

    /// No mode held and no turn in progress.
    fn is_idle(&self) -> bool {
        let view = self.view.read();
        view.active_mode.is_none() && view.state.is_idle()
    }
}

/// Routes each input to one mode and drives that mode's lifecycle.
///
/// Concurrent sessions proceed independently; turns within one session are
/// strictly sequential. `submit` never returns `Err`: every failure is
/// reported through [`ModeResult::error`].
pub struct ModeEngine {
    config: EngineConfig,
    registry: Arc<ModeRegistry>,
    router: ConfidenceRouter,
    sessions: Arc<SessionManager>,
    metrics: Arc<MetricsCollector>,
    events: Arc<EventBus>,
    slots: DashMap<String, Arc<SessionSlot>>,
    shut_down: AtomicBool,
}

impl ModeEngine {
    pub fn builder(config: EngineConfig) -> ModeEngineBuilder {
        ModeEngineBuilder::new(config)
    }

    pub(super) fn from_parts(
        config: EngineConfig,
        registry: Arc<ModeRegistry>,
        router: ConfidenceRouter,
        sessions: Arc<SessionManager>,
        metrics: Arc<MetricsCollector>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            registry,
            router,
            sessions,
            metrics,
            events,
            slots: DashMap::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub async fn submit(
        &self,
        session_id: &str,
        input: &str,
        metadata: HashMap<String, Value>,
    ) -> ModeResult {
        if self.is_shut_down() {
            return Self::unavailable();
        }
        let slot = self.slot(session_id);
        let _turn = slot.turn.lock().await;
        // Shutdown may have won the race for the turn lock.
        if self.is_shut_down() {
            return Self::unavailable();
        }

        let started = Instant::now();
        slot.view.write().last_used = Some(started);
        let previous = slot.active_mode();
        let ctx = ModeContext::new(session_id, input)
            .with_previous_mode(previous.clone())
            .with_metadata(metadata);

        self.advance(&slot, session_id, EngineState::Routing);
        let decision = self.router.route(&ctx).await;
        let winner = decision.winner.clone();

        if let Some(prev) = previous.as_ref()
            && prev != &winner
        {
            debug!(session = %session_id, from = %prev, to = %winner, "Switching mode");
            self.retire(&slot, prev, session_id, "mode_change").await;
        }

        let Some(plugin) = self.registry.get(winner.as_str()) else {
            self.advance(&slot, session_id, EngineState::Failed);
            self.advance(&slot, session_id, EngineState::Idle);
            return ModeResult::failure(ModeFailure::new(
                FailureKind::ActivationFailure,
                format!("mode '{}' is no longer registered", winner),
            ))
            .with_mode(winner)
            .with_processing_time(started.elapsed());
        };

        if slot.active_mode().as_ref() != Some(&winner)
            && let Some(denied) = self.activate(&slot, &plugin, &ctx, &decision).await
        {
            return denied.with_processing_time(started.elapsed());
        }

        self.advance(&slot, session_id, EngineState::Processing);
        self.session_step(&winner, session_id, SessionState::Processing);

        let process_started = Instant::now();
        let call = self
            .call_plugin(plugin.config().timeout(), plugin.process(&ctx))
            .await;
        let elapsed = process_started.elapsed();

        match call {
            PluginCall::Returned(result) => {
                self.session_step(&winner, session_id, SessionState::Active);
                self.metrics
                    .record(&winner, decision.confidence, elapsed, Outcome::Success);
                self.advance(&slot, session_id, EngineState::Completed);
                self.advance(&slot, session_id, EngineState::Idle);
                self.events.publish(EngineEvent::Display(DisplayUpdate::for_mode(
                    plugin.config(),
                    session_id,
                )));

                let mut result = result
                    .with_mode(winner)
                    .with_confidence(decision.confidence)
                    .with_processing_time(elapsed);
                result
                    .metadata
                    .insert("used_fallback".into(), Value::Bool(decision.used_fallback));
                result
            }
            PluginCall::TimedOut(after) => {
                // The process future is already dropped; nothing it produces can land.
                self.session_step(&winner, session_id, SessionState::TimedOut);
                self.metrics.record(&winner, 0.0, elapsed, Outcome::TimedOut);
                self.advance(&slot, session_id, EngineState::TimedOut);
                warn!(
                    mode = %winner,
                    session = %session_id,
                    timeout_ms = duration_ms(after),
                    "Processing timed out"
                );

                self.advance(&slot, session_id, EngineState::Deactivating);
                self.retire(&slot, &winner, session_id, "timeout").await;
                self.advance(&slot, session_id, EngineState::Idle);

                ModeResult::failure(ModeFailure::timeout(
                    winner.as_str(),
                    duration_ms(after),
                ))
                .with_mode(winner)
                .with_processing_time(elapsed)
            }
            failed => {
                let message = failed.describe("processing");
                self.session_step(&winner, session_id, SessionState::Failed);
                self.metrics.record(&winner, 0.0, elapsed, Outcome::Failed);
                self.advance(&slot, session_id, EngineState::Failed);
                warn!(mode = %winner, session = %session_id, error = %message, "Processing failed");

                self.advance(&slot, session_id, EngineState::Deactivating);
                self.retire(&slot, &winner, session_id, "error").await;
                self.advance(&slot, session_id, EngineState::Idle);

                ModeResult::failure(ModeFailure::new(FailureKind::ProcessingError, message))
                    .with_mode(winner)
                    .with_processing_time(elapsed)
            }
        }
    }

    /// Scores `input` for the session without activating anything.
    pub async fn route(&self, session_id: &str, input: &str) -> RoutingDecision {
        let previous = self
            .slots
            .get(session_id)
            .and_then(|slot| slot.active_mode());
        let ctx = ModeContext::new(session_id, input).with_previous_mode(previous);
        self.router.route(&ctx).await
    }

    /// Deactivates the session's active mode. Returns false if none was active.
    ///
    /// The session's history is kept; see [`ModeEngine::forget_session`].
    pub async fn end_session(&self, session_id: &str) -> bool {
        let Some(slot) = self.existing_slot(session_id) else {
            return false;
        };
        let _turn = slot.turn.lock().await;
        self.end_locked(&slot, session_id, "session_end").await
    }

    /// Ends the session and drops everything tracked for it, history
    /// included. Returns false for unknown sessions.
    ///
    /// A slot another caller is still waiting on stays in place.
    pub async fn forget_session(&self, session_id: &str) -> bool {
        let Some(slot) = self.existing_slot(session_id) else {
            return false;
        };
        {
            let _turn = slot.turn.lock().await;
            self.end_locked(&slot, session_id, "session_end").await;
        }
        // One reference here, one in the map.
        let removed = self
            .slots
            .remove_if(session_id, |_, held| Arc::strong_count(held) == 2)
            .is_some();
        debug!(session = %session_id, removed, "Session forgotten");
        true
    }

    /// Ends every session and refuses further submits.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots: Vec<(String, Arc<SessionSlot>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut ended = 0usize;
        for (session_id, slot) in slots {
            let _turn = slot.turn.lock().await;
            if self.end_locked(&slot, &session_id, "shutdown").await {
                ended += 1;
            }
        }
        self.slots.retain(|_, slot| Arc::strong_count(slot) == 1);
        info!(sessions = ended, "Mode engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn active_mode(&self, session_id: &str) -> Option<ModeId> {
        self.slots
            .get(session_id)
            .and_then(|slot| slot.active_mode())
    }

    /// Modes activated for the session, oldest first.
    pub fn mode_history(&self, session_id: &str) -> Vec<ModeHistoryEntry> {
        self.slots
            .get(session_id)
            .map(|slot| slot.view.read().history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Caller sessions the engine currently holds state for.
    pub fn tracked_sessions(&self) -> usize {
        self.slots.len()
    }

    pub fn engine_state(&self, session_id: &str) -> EngineState {
        self.slots
            .get(session_id)
            .map(|slot| slot.view.read().state)
            .unwrap_or_default()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn subscribe_display(&self) -> DisplayReceiver {
        self.events.subscribe_display()
    }

    pub fn subscribe_analytics(&self) -> AnalyticsReceiver {
        self.events.subscribe_analytics()
    }

    pub fn registry(&self) -> &Arc<ModeRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn unavailable() -> ModeResult {
        ModeResult::failure(ModeFailure::new(
            FailureKind::Unavailable,
            "engine is shut down",
        ))
    }

    fn existing_slot(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.slots.get(session_id).map(|s| Arc::clone(s.value()))
    }

    fn slot(&self, session_id: &str) -> Arc<SessionSlot> {
        if let Some(slot) = self.existing_slot(session_id) {
            return slot;
        }
        let slot = Arc::clone(
            self.slots
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionSlot::new()))
                .value(),
        );
        if self.slots.len() > self.config.session.max_tracked_sessions {
            self.evict_idle();
        }
        slot
    }

    /// Drops the least recently used slots that hold no mode and that no
    /// caller is using, until the map is back under its limit.
    fn evict_idle(&self) {
        let limit = self.config.session.max_tracked_sessions;
        let mut candidates: Vec<(String, Option<Instant>)> = self
            .slots
            .iter()
            .filter(|entry| Arc::strong_count(entry.value()) == 1 && entry.is_idle())
            .map(|entry| (entry.key().clone(), entry.view.read().last_used))
            .collect();
        candidates.sort_by_key(|(_, last_used)| *last_used);

        let excess = self.slots.len().saturating_sub(limit);
        let mut evicted = 0usize;
        for (session_id, _) in candidates {
            if evicted >= excess {
                break;
            }
            let removed = self.slots.remove_if(&session_id, |_, slot| {
                Arc::strong_count(slot) == 1 && slot.is_idle()
            });
            if removed.is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, tracked = self.slots.len(), limit, "Evicted idle session slots");
        }
    }

    /// Retires the active mode, if any. The caller holds the turn lock.
    async fn end_locked(&self, slot: &SessionSlot, session_id: &str, reason: &str) -> bool {
        let Some(mode_id) = slot.active_mode() else {
            return false;
        };
        self.advance(slot, session_id, EngineState::Deactivating);
        self.retire(slot, &mode_id, session_id, reason).await;
        self.advance(slot, session_id, EngineState::Idle);
        true
    }

    fn advance(&self, slot: &SessionSlot, session_id: &str, to: EngineState) {
        let mut view = slot.view.write();
        let from = view.state;
        if !from.can_transition_to(to) {
            warn!(session = %session_id, %from, %to, "Unexpected engine state transition");
        }
        view.state = to;
        debug!(session = %session_id, %from, %to, "Engine state changed");
    }

    fn session_step(&self, mode_id: &ModeId, session_id: &str, to: SessionState) {
        if let Err(e) = self.sessions.transition(mode_id, session_id, to) {
            debug!(mode = %mode_id, session = %session_id, error = %e, "Session transition skipped");
        }
    }

    async fn call_plugin<T, F>(&self, deadline: Duration, fut: F) -> PluginCall<T>
    where
        F: Future<Output = Result<T>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        match self.sessions.with_timeout(deadline, guarded).await {
            TimeoutOutcome::Completed(Ok(Ok(value))) => PluginCall::Returned(value),
            TimeoutOutcome::Completed(Ok(Err(e))) => PluginCall::Failed(e.to_string()),
            TimeoutOutcome::Completed(Err(_)) => PluginCall::Panicked,
            TimeoutOutcome::TimedOut { after } => PluginCall::TimedOut(after),
        }
    }

    /// Grants capacity and activates `plugin`. Returns the failure result
    /// when the mode could not be activated.
    async fn activate(
        &self,
        slot: &SessionSlot,
        plugin: &SharedPlugin,
        ctx: &ModeContext,
        decision: &RoutingDecision,
    ) -> Option<ModeResult> {
        let mode_id = plugin.id();
        let session_id = ctx.session_id.as_str();

        if let AcquireResult::Denied(reason) = self.sessions.try_acquire(mode_id, session_id) {
            let failure = match reason {
                DenyReason::ConcurrencyLimit { active, max } => {
                    self.metrics.record_rejection(mode_id);
                    ModeFailure::concurrency_limit(mode_id.as_str(), active, max)
                }
                DenyReason::AlreadyActive => {
                    self.metrics.record_rejection(mode_id);
                    ModeFailure::new(
                        FailureKind::ConcurrencyLimitExceeded,
                        format!("session '{}' already holds a '{}' slot", session_id, mode_id),
                    )
                }
                DenyReason::UnknownMode => {
                    self.metrics
                        .record(mode_id, 0.0, Duration::ZERO, Outcome::ActivationFailed);
                    ModeFailure::new(
                        FailureKind::ActivationFailure,
                        format!("mode '{}' has no session capacity configured", mode_id),
                    )
                }
            };
            debug!(mode = %mode_id, session = %session_id, kind = %failure.kind, "Activation denied");
            self.advance(slot, session_id, EngineState::Failed);
            self.advance(slot, session_id, EngineState::Idle);
            return Some(ModeResult::failure(failure).with_mode(mode_id.clone()));
        }

        self.advance(slot, session_id, EngineState::Activating);
        self.session_step(mode_id, session_id, SessionState::Activating);

        let call = self
            .call_plugin(plugin.config().timeout(), plugin.activate(ctx))
            .await;
        if !matches!(call, PluginCall::Returned(())) {
            let message = call.describe("activation");
            warn!(mode = %mode_id, session = %session_id, error = %message, "Activation failed");

            self.session_step(mode_id, session_id, SessionState::Failed);
            self.session_step(mode_id, session_id, SessionState::Terminated);
            self.sessions.release(mode_id, session_id);
            self.metrics
                .record(mode_id, 0.0, Duration::ZERO, Outcome::ActivationFailed);
            self.advance(slot, session_id, EngineState::Failed);
            self.advance(slot, session_id, EngineState::Idle);
            return Some(
                ModeResult::failure(ModeFailure::new(FailureKind::ActivationFailure, message))
                    .with_mode(mode_id.clone()),
            );
        }

        self.session_step(mode_id, session_id, SessionState::Active);
        self.metrics.activated(mode_id);
        {
            let mut view = slot.view.write();
            view.active_mode = Some(mode_id.clone());
            view.history.push_back(ModeHistoryEntry::new(mode_id.clone()));
            while view.history.len() > self.config.session.history_limit {
                view.history.pop_front();
            }
        }

        let mut event =
            AnalyticsEvent::new(AnalyticsEventType::ModeActivation, mode_id.clone(), session_id)
                .with_metadata("confidence", decision.confidence)
                .with_metadata("used_fallback", decision.used_fallback);
        if let Some(previous) = &ctx.previous_mode {
            event = event.with_metadata("previous_mode", previous.as_str());
        }
        self.events.publish(EngineEvent::Analytics(event));

        debug!(
            mode = %mode_id,
            session = %session_id,
            confidence = decision.confidence,
            fallback = decision.used_fallback,
            "Mode activated"
        );
        None
    }

    /// Deactivates `mode_id` for the session and frees its slot.
    async fn retire(&self, slot: &SessionSlot, mode_id: &ModeId, session_id: &str, reason: &str) {
        if self
            .sessions
            .state(mode_id, session_id)
            .is_some_and(|state| state.is_live())
        {
            self.session_step(mode_id, session_id, SessionState::Completing);
        }

        match self.registry.get(mode_id.as_str()) {
            Some(plugin) => {
                let call = self
                    .call_plugin(
                        self.config.session.deactivation_timeout(),
                        plugin.deactivate(session_id),
                    )
                    .await;
                if !matches!(call, PluginCall::Returned(())) {
                    warn!(
                        mode = %mode_id,
                        session = %session_id,
                        error = %call.describe("deactivation"),
                        "Deactivation failed"
                    );
                }
            }
            None => {
                warn!(mode = %mode_id, session = %session_id, "Deactivating a mode that is no longer registered");
            }
        }

        self.session_step(mode_id, session_id, SessionState::Terminated);
        self.sessions.release(mode_id, session_id);
        self.metrics.deactivated(mode_id);
        {
            let mut view = slot.view.write();
            if view.active_mode.as_ref() == Some(mode_id) {
                view.active_mode = None;
            }
        }

        self.events.publish(EngineEvent::Analytics(
            AnalyticsEvent::new(
                AnalyticsEventType::ModeDeactivation,
                mode_id.clone(),
                session_id,
            )
            .with_metadata("reason", reason),
        ));
        debug!(mode = %mode_id, session = %session_id, reason, "Mode deactivated");
    }
}
