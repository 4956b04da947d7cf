use std::sync::Arc;

use tracing::info;

use super::dispatch::ModeEngine;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::metrics::MetricsCollector;
use crate::mode::{KeywordPlugin, SharedPlugin};
use crate::registry::ModeRegistry;
use crate::router::ConfidenceRouter;
use crate::session::SessionManager;

/// Assembles a [`ModeEngine`] from plugins and shared collaborators.
///
/// Registry, session manager, metrics and event bus are created once here and
/// shared by `Arc`; pass your own metrics or bus to observe them from outside.
pub struct ModeEngineBuilder {
    config: EngineConfig,
    plugins: Vec<SharedPlugin>,
    disabled: Vec<String>,
    metrics: Option<Arc<MetricsCollector>>,
    events: Option<Arc<EventBus>>,
}

impl ModeEngineBuilder {
    /// Starts with no plugins; `config.modes` is not consulted.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
            disabled: Vec::new(),
            metrics: None,
            events: None,
        }
    }

    /// Validates `config` and registers a keyword plugin per `[[modes]]` entry.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let plugins: Vec<SharedPlugin> = config
            .modes
            .iter()
            .map(|def| Arc::new(KeywordPlugin::new(def)) as SharedPlugin)
            .collect();
        let disabled = config
            .modes
            .iter()
            .filter(|def| !def.enabled)
            .map(|def| def.id.clone())
            .collect();

        Ok(Self {
            plugins,
            disabled,
            ..Self::new(config)
        })
    }

    pub fn with_plugin(mut self, plugin: SharedPlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = SharedPlugin>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Fails on invalid router, session or event settings, duplicate ids,
    /// a second fallback, or no fallback at all.
    pub fn build(self) -> Result<ModeEngine> {
        self.config.validate_sections()?;

        let registry = Arc::new(ModeRegistry::new());
        for plugin in self.plugins {
            registry.register(plugin)?;
        }
        for id in &self.disabled {
            registry.set_enabled(id, false)?;
        }

        let router = ConfidenceRouter::new(Arc::clone(&registry), self.config.router.clone())?;

        let sessions = Arc::new(SessionManager::new());
        for plugin in registry.all() {
            sessions.register_mode(plugin.id().clone(), plugin.config().max_concurrent_sessions);
        }

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new()));
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(EventBus::new(self.config.events.channel_capacity)));

        info!(
            modes = registry.len(),
            enabled = registry.enabled().len(),
            fallback = %router.fallback(),
            "Mode engine ready"
        );

        Ok(ModeEngine::from_parts(
            self.config,
            registry,
            router,
            sessions,
            metrics,
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModeError;
    use crate::mode::builtin;

    #[test]
    fn test_build_requires_fallback() {
        let result = ModeEngineBuilder::new(EngineConfig::default())
            .with_plugin(Arc::new(KeywordPlugin::new(&builtin::planning())))
            .build();
        assert!(matches!(result, Err(ModeError::MissingFallback)));
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let result = ModeEngineBuilder::new(EngineConfig::default())
            .with_plugin(Arc::new(KeywordPlugin::new(&builtin::general())))
            .with_plugin(Arc::new(KeywordPlugin::new(&builtin::general())))
            .build();
        assert!(matches!(result, Err(ModeError::ModeAlreadyRegistered(_))));
    }

    #[test]
    fn test_disabled_definitions_are_registered_but_skipped() {
        let mut config = EngineConfig::default();
        for def in config.modes.iter_mut().filter(|d| d.id == "planning") {
            def.enabled = false;
        }
        let engine = ModeEngineBuilder::from_config(config)
            .unwrap()
            .build()
            .unwrap();

        assert!(engine.registry().contains("planning"));
        assert!(!engine.registry().is_enabled("planning"));
        assert_eq!(engine.registry().len(), 7);
    }

    #[test]
    fn test_build_rejects_invalid_sections() {
        let mut config = EngineConfig::default();
        config.router.activation_threshold = 1.5;
        let result = ModeEngineBuilder::new(config)
            .with_plugin(Arc::new(KeywordPlugin::new(&builtin::general())))
            .build();

        let Err(ModeError::Config(message)) = result else {
            panic!("expected a configuration error");
        };
        assert!(message.contains("activation_threshold"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.router.activation_threshold = 2.0;
        assert!(matches!(
            ModeEngineBuilder::from_config(config),
            Err(ModeError::Config(_))
        ));
    }
}
