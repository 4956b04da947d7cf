//! Configuration types and loading.
//!
//! - `EngineConfig`: top-level configuration with validation
//! - `RouterConfig`, `SessionConfig`, `EventConfig`: per-component settings
//! - Mode tables come from `ModeDefinition` entries under `[[modes]]`

mod settings;

pub use settings::{CONFIG_FILE_NAME, EngineConfig, EventConfig, RouterConfig, SessionConfig};
