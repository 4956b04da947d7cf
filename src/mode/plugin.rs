//! Handler contract implemented by every mode.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::types::{ConfidenceScore, ModeConfig, ModeContext, ModeId, ModeResult};
use crate::error::Result;

/// A pluggable mode handler.
///
/// The engine drives a plugin through `score` on every input, then
/// `activate` → `process`* → `deactivate` for each session it wins.
#[async_trait]
pub trait ModePlugin: Send + Sync {
    fn config(&self) -> &ModeConfig;

    fn id(&self) -> &ModeId {
        &self.config().id
    }

    /// Self-assessed fitness for `ctx`. Must be side-effect free; the router
    /// time-boxes this call and treats errors as confidence 0.
    async fn score(&self, ctx: &ModeContext) -> Result<ConfidenceScore>;

    /// Called once when the mode wins a session.
    async fn activate(&self, ctx: &ModeContext) -> Result<()>;

    /// Main body. The future may be dropped at the deadline.
    async fn process(&self, ctx: &ModeContext) -> Result<ModeResult>;

    /// Called exactly once per ended session; a repeated call must be a no-op.
    async fn deactivate(&self, session_id: &str) -> Result<()>;
}

pub type SharedPlugin = Arc<dyn ModePlugin>;

/// Tracks which sessions a plugin currently considers active.
///
/// Gives plugins idempotent activate/deactivate bookkeeping for free.
#[derive(Debug, Default)]
pub struct ActiveSessions {
    ids: Mutex<HashSet<String>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the session was already active.
    pub fn insert(&self, session_id: &str) -> bool {
        self.ids.lock().insert(session_id.to_string())
    }

    /// Returns false on a repeated removal.
    pub fn remove(&self, session_id: &str) -> bool {
        self.ids.lock().remove(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.ids.lock().contains(session_id)
    }
}
