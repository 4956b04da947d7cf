use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mode::ModeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Created,
    Activating,
    Active,
    Processing,
    Completing,
    TimedOut,
    Failed,
    Terminated,
}

impl SessionState {
    pub fn allowed_transitions(&self) -> &'static [SessionState] {
        use SessionState::*;
        match self {
            Created => &[Activating, Failed, Terminated],
            Activating => &[Active, Failed],
            Active => &[Processing, Completing],
            // Processing -> Active is the only backwards edge: one per finished turn.
            Processing => &[Active, Completing, TimedOut, Failed],
            Completing => &[Terminated],
            TimedOut => &[Terminated],
            Failed => &[Terminated],
            Terminated => &[],
        }
    }

    pub fn can_transition_to(&self, target: SessionState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// States that hold a capacity slot and wind down through `Completing`.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Processing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Activating => "Activating",
            Self::Active => "Active",
            Self::Processing => "Processing",
            Self::Completing => "Completing",
            Self::TimedOut => "TimedOut",
            Self::Failed => "Failed",
            Self::Terminated => "Terminated",
        };
        write!(f, "{}", s)
    }
}

/// Binding of one caller session to one mode.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub session_id: String,
    pub mode_id: ModeId,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub turns: u64,
}

impl Session {
    pub fn new(session_id: impl Into<String>, mode_id: ModeId) -> Self {
        Self {
            session_id: session_id.into(),
            mode_id,
            state: SessionState::Created,
            started_at: Utc::now(),
            turns: 0,
        }
    }
}

/// A mode that became active for a caller session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeHistoryEntry {
    pub mode_id: ModeId,
    pub timestamp: DateTime<Utc>,
}

impl ModeHistoryEntry {
    pub fn new(mode_id: ModeId) -> Self {
        Self {
            mode_id,
            timestamp: Utc::now(),
        }
    }
}
