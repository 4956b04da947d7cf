//! Session lifecycle and capacity management.
//!
//! - `SessionState`: per-(session, mode) lifecycle with validated transitions
//! - `SessionManager`: capacity grants, releases, and the timeout wrapper
//! - `ModeHistoryEntry`: record of modes activated for a caller session

mod manager;
mod state;

pub use manager::{AcquireResult, DenyReason, SessionManager, TimeoutOutcome};
pub use state::{ModeHistoryEntry, Session, SessionState};
