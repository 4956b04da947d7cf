//! Mode handler contract and the data-driven built-in modes.
//!
//! - `ModePlugin`: async scoring + lifecycle contract the engine drives
//! - `KeywordPlugin`: one generic handler configured by `ModeDefinition` tables
//! - `builtin`: the default mode set (general fallback plus six specialists)

pub mod builtin;
mod keyword;
mod plugin;
mod types;

pub use keyword::{
    Assessment, Handoff, Intensity, KeywordPlugin, ModeDefinition, ScoringWeights, Signals, Tokens,
};
pub use plugin::{ActiveSessions, ModePlugin, SharedPlugin};
pub use types::{ConfidenceScore, ModeCategory, ModeConfig, ModeContext, ModeId, ModeResult};

pub(crate) use types::{clamp_confidence, duration_ms};
