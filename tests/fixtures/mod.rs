#![allow(dead_code)]

pub mod mock_plugin;

use std::sync::Arc;

use modeflow::config::EngineConfig;
use modeflow::engine::{ModeEngine, ModeEngineBuilder};
use modeflow::mode::SharedPlugin;

pub use mock_plugin::{CallCounters, MockPlugin, ProcessBehavior};

/// Engine over `plugins` only, with default router and session settings.
pub fn engine_with(plugins: Vec<MockPlugin>) -> ModeEngine {
    engine_with_config(EngineConfig::default(), plugins)
}

pub fn engine_with_config(config: EngineConfig, plugins: Vec<MockPlugin>) -> ModeEngine {
    ModeEngineBuilder::new(config)
        .with_plugins(
            plugins
                .into_iter()
                .map(|p| Arc::new(p) as SharedPlugin),
        )
        .build()
        .expect("engine builds")
}
