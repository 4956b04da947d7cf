//! Mode engine: the caller-facing orchestrator.
//!
//! - `ModeEngine`: routes input, switches and activates modes, runs turns
//! - `ModeEngineBuilder`: wires registry, router, sessions, metrics and events
//! - `EngineState`: per-session turn state machine

mod builder;
mod dispatch;
mod state;

pub use builder::ModeEngineBuilder;
pub use dispatch::ModeEngine;
pub use state::EngineState;
