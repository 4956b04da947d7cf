use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a caller session is within the current `submit` turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    Routing,
    Activating,
    Processing,
    Completed,
    TimedOut,
    Failed,
    Deactivating,
}

impl EngineState {
    pub fn allowed_transitions(&self) -> &'static [EngineState] {
        use EngineState::*;
        match self {
            // Deactivating straight from Idle is an explicit end_session.
            Idle => &[Routing, Deactivating],
            // Processing directly when the winner is already active.
            Routing => &[Activating, Processing, Failed],
            Activating => &[Processing, Failed],
            Processing => &[Completed, TimedOut, Failed],
            Completed => &[Idle],
            TimedOut => &[Deactivating],
            // Idle when nothing was activated (denied or activation failed).
            Failed => &[Deactivating, Idle],
            Deactivating => &[Idle],
        }
    }

    pub fn can_transition_to(&self, target: EngineState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Routing => "Routing",
            Self::Activating => "Activating",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::TimedOut => "TimedOut",
            Self::Failed => "Failed",
            Self::Deactivating => "Deactivating",
        };
        write!(f, "{}", s)
    }
}
