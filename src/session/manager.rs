//! Per-mode capacity accounting and per-session lifecycle state.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use super::state::{Session, SessionState};
use crate::error::{ModeError, Result};
use crate::mode::{ModeId, duration_ms};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    ConcurrencyLimit { active: usize, max: usize },
    AlreadyActive,
    UnknownMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Granted,
    Denied(DenyReason),
}

impl AcquireResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

#[derive(Debug)]
pub enum TimeoutOutcome<T> {
    Completed(T),
    TimedOut { after: Duration },
}

#[derive(Debug)]
struct ModeSlots {
    max: usize,
    active: AtomicUsize,
}

impl ModeSlots {
    fn new(max: usize) -> Self {
        Self {
            max,
            active: AtomicUsize::new(0),
        }
    }

    /// Ok(new count) on success, Err(current count) when full.
    fn try_take(&self) -> std::result::Result<usize, usize> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .map(|prev| prev + 1)
    }

    fn give_back(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    fn current(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    session_id: String,
    mode_id: ModeId,
}

impl SessionKey {
    fn new(mode_id: &ModeId, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            mode_id: mode_id.clone(),
        }
    }
}

/// Grants and revokes mode capacity; never blocks or queues.
///
/// All mutations for one (session, mode) key go through a single DashMap
/// entry, so they are serialized per key.
#[derive(Debug, Default)]
pub struct SessionManager {
    slots: DashMap<ModeId, Arc<ModeSlots>>,
    sessions: DashMap<SessionKey, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the mode was already registered.
    pub fn register_mode(&self, mode_id: ModeId, max_concurrent: usize) -> bool {
        match self.slots.entry(mode_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(Arc::new(ModeSlots::new(max_concurrent)));
                true
            }
        }
    }

    fn slots(&self, mode_id: &ModeId) -> Option<Arc<ModeSlots>> {
        self.slots.get(mode_id).map(|s| Arc::clone(s.value()))
    }

    pub fn try_acquire(&self, mode_id: &ModeId, session_id: &str) -> AcquireResult {
        let Some(slots) = self.slots(mode_id) else {
            return AcquireResult::Denied(DenyReason::UnknownMode);
        };

        match self.sessions.entry(SessionKey::new(mode_id, session_id)) {
            Entry::Occupied(_) => AcquireResult::Denied(DenyReason::AlreadyActive),
            Entry::Vacant(v) => match slots.try_take() {
                Ok(active) => {
                    v.insert(Session::new(session_id, mode_id.clone()));
                    debug!(mode = %mode_id, session = %session_id, active, max = slots.max, "Capacity granted");
                    AcquireResult::Granted
                }
                Err(active) => {
                    debug!(mode = %mode_id, session = %session_id, active, max = slots.max, "Capacity denied");
                    AcquireResult::Denied(DenyReason::ConcurrencyLimit {
                        active,
                        max: slots.max,
                    })
                }
            },
        }
    }

    /// Frees the slot held by the session. A no-op for sessions that were
    /// never granted or were already released.
    pub fn release(&self, mode_id: &ModeId, session_id: &str) -> bool {
        let removed = self
            .sessions
            .remove(&SessionKey::new(mode_id, session_id))
            .is_some();
        if removed && let Some(slots) = self.slots(mode_id) {
            slots.give_back();
            debug!(mode = %mode_id, session = %session_id, active = slots.current(), "Capacity released");
        }
        removed
    }

    /// Moves a session to `to`, returning the previous state.
    pub fn transition(
        &self,
        mode_id: &ModeId,
        session_id: &str,
        to: SessionState,
    ) -> Result<SessionState> {
        let mut session = self
            .sessions
            .get_mut(&SessionKey::new(mode_id, session_id))
            .ok_or_else(|| ModeError::SessionNotFound {
                session_id: session_id.to_string(),
                mode_id: mode_id.to_string(),
            })?;

        let from = session.state;
        if !from.can_transition_to(to) {
            return Err(ModeError::InvalidSessionTransition {
                from: from.to_string(),
                to: to.to_string(),
                allowed: from
                    .allowed_transitions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        session.state = to;
        if from == SessionState::Processing && to == SessionState::Active {
            session.turns += 1;
        }
        Ok(from)
    }

    /// Races `fut` against `deadline`; the loser is dropped.
    ///
    /// A value that only becomes ready after the deadline is discarded too:
    /// `timeout` polls the inner future first, so a future that blocks its
    /// thread past the deadline still resolves `Ok`.
    pub async fn with_timeout<F, T>(&self, deadline: Duration, fut: F) -> TimeoutOutcome<T>
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        match tokio::time::timeout(deadline, fut).await {
            Ok(value) if started.elapsed() <= deadline => TimeoutOutcome::Completed(value),
            Ok(_) => {
                debug!(
                    deadline_ms = duration_ms(deadline),
                    "Discarding result that completed after its deadline"
                );
                TimeoutOutcome::TimedOut { after: deadline }
            }
            Err(_) => TimeoutOutcome::TimedOut { after: deadline },
        }
    }

    pub fn session(&self, mode_id: &ModeId, session_id: &str) -> Option<Session> {
        self.sessions
            .get(&SessionKey::new(mode_id, session_id))
            .map(|s| s.value().clone())
    }

    pub fn state(&self, mode_id: &ModeId, session_id: &str) -> Option<SessionState> {
        self.sessions
            .get(&SessionKey::new(mode_id, session_id))
            .map(|s| s.state)
    }

    pub fn active_count(&self, mode_id: &ModeId) -> usize {
        self.slots(mode_id).map_or(0, |s| s.current())
    }

    pub fn total_active(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(mode: &str, max: usize) -> (SessionManager, ModeId) {
        let manager = SessionManager::new();
        let id = ModeId::new(mode);
        manager.register_mode(id.clone(), max);
        (manager, id)
    }

    #[test]
    fn test_acquire_until_full() {
        let (manager, mode) = manager("planning", 2);

        assert!(manager.try_acquire(&mode, "s1").is_granted());
        assert!(manager.try_acquire(&mode, "s2").is_granted());
        assert_eq!(
            manager.try_acquire(&mode, "s3"),
            AcquireResult::Denied(DenyReason::ConcurrencyLimit { active: 2, max: 2 })
        );
        assert_eq!(manager.active_count(&mode), 2);

        assert!(manager.release(&mode, "s1"));
        assert!(manager.try_acquire(&mode, "s3").is_granted());
    }

    #[test]
    fn test_double_acquire_same_session_denied() {
        let (manager, mode) = manager("planning", 5);
        assert!(manager.try_acquire(&mode, "s1").is_granted());
        assert_eq!(
            manager.try_acquire(&mode, "s1"),
            AcquireResult::Denied(DenyReason::AlreadyActive)
        );
        assert_eq!(manager.active_count(&mode), 1);
    }

    #[test]
    fn test_unknown_mode_denied() {
        let manager = SessionManager::new();
        assert_eq!(
            manager.try_acquire(&ModeId::new("ghost"), "s1"),
            AcquireResult::Denied(DenyReason::UnknownMode)
        );
    }

    #[test]
    fn test_release_without_grant_is_noop() {
        let (manager, mode) = manager("planning", 1);
        assert!(!manager.release(&mode, "never-granted"));
        assert!(!manager.release(&ModeId::new("ghost"), "s1"));

        assert!(manager.try_acquire(&mode, "s1").is_granted());
        assert!(manager.release(&mode, "s1"));
        assert!(!manager.release(&mode, "s1"));
        assert_eq!(manager.active_count(&mode), 0);
    }

    #[test]
    fn test_transitions_validated() {
        let (manager, mode) = manager("planning", 1);
        manager.try_acquire(&mode, "s1");

        assert_eq!(
            manager
                .transition(&mode, "s1", SessionState::Activating)
                .unwrap(),
            SessionState::Created
        );
        manager.transition(&mode, "s1", SessionState::Active).unwrap();
        manager
            .transition(&mode, "s1", SessionState::Processing)
            .unwrap();
        manager.transition(&mode, "s1", SessionState::Active).unwrap();
        assert_eq!(manager.session(&mode, "s1").unwrap().turns, 1);

        let err = manager
            .transition(&mode, "s1", SessionState::Activating)
            .unwrap_err();
        assert!(matches!(err, ModeError::InvalidSessionTransition { .. }));
        assert_eq!(manager.state(&mode, "s1"), Some(SessionState::Active));
    }

    #[test]
    fn test_no_transition_after_release() {
        let (manager, mode) = manager("planning", 1);
        manager.try_acquire(&mode, "s1");
        manager
            .transition(&mode, "s1", SessionState::Activating)
            .unwrap();
        manager.transition(&mode, "s1", SessionState::Active).unwrap();
        manager
            .transition(&mode, "s1", SessionState::Processing)
            .unwrap();
        manager
            .transition(&mode, "s1", SessionState::TimedOut)
            .unwrap();
        manager.release(&mode, "s1");

        let late = manager.transition(&mode, "s1", SessionState::Active);
        assert!(matches!(late, Err(ModeError::SessionNotFound { .. })));
        assert_eq!(manager.active_count(&mode), 0);
    }

    #[tokio::test]
    async fn test_with_timeout_outcomes() {
        let manager = SessionManager::new();

        let fast = manager
            .with_timeout(Duration::from_millis(200), async { 7 })
            .await;
        assert!(matches!(fast, TimeoutOutcome::Completed(7)));

        let slow = manager
            .with_timeout(Duration::from_millis(20), async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                7
            })
            .await;
        assert!(matches!(slow, TimeoutOutcome::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_with_timeout_discards_late_value_from_blocking_future() {
        let manager = SessionManager::new();

        // Never yields, so the timer only gets checked after the value is ready.
        let outcome = manager
            .with_timeout(Duration::from_millis(20), async {
                std::thread::sleep(Duration::from_millis(120));
                7
            })
            .await;
        assert!(matches!(
            outcome,
            TimeoutOutcome::TimedOut { after } if after == Duration::from_millis(20)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_never_exceeded_under_storm() {
        let manager = Arc::new(SessionManager::new());
        let mode = ModeId::new("planning");
        manager.register_mode(mode.clone(), 3);
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for worker in 0..32 {
            let manager = Arc::clone(&manager);
            let mode = mode.clone();
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                for round in 0..50 {
                    let session = format!("w{}-r{}", worker, round);
                    if manager.try_acquire(&mode, &session).is_granted() {
                        let active = manager.active_count(&mode);
                        assert!(active <= 3, "active {} exceeds max", active);
                        peak.fetch_max(active, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        assert!(manager.release(&mode, &session));
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(manager.active_count(&mode), 0);
        assert_eq!(manager.total_active(), 0);
    }
}
