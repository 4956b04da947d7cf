pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod mode;
pub mod registry;
pub mod router;
pub mod session;

pub use config::EngineConfig;
pub use engine::{EngineState, ModeEngine, ModeEngineBuilder};
pub use error::{FailureKind, ModeError, ModeFailure, Result};
pub use events::{AnalyticsEvent, DisplayUpdate, EngineEvent, EventBus};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use mode::{
    ConfidenceScore, KeywordPlugin, ModeCategory, ModeConfig, ModeContext, ModeDefinition,
    ModeId, ModePlugin, ModeResult, SharedPlugin,
};
pub use registry::ModeRegistry;
pub use router::{ConfidenceRouter, RoutingDecision};
pub use session::{SessionManager, SessionState};
