//! Registry of mode plugins.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ModeError, Result};
use crate::mode::{ModeCategory, ModeId, SharedPlugin};

/// Holds every registered plugin, indexed by mode id.
///
/// Configs are owned by the plugins and only ever exposed by shared
/// reference, so they cannot change after registration.
#[derive(Default)]
pub struct ModeRegistry {
    modes: RwLock<HashMap<ModeId, SharedPlugin>>,
    disabled: RwLock<HashSet<ModeId>>,
    fallback: RwLock<Option<ModeId>>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, plugin: SharedPlugin) -> Result<()> {
        let id = plugin.id().clone();
        let is_fallback = plugin.config().fallback;

        // Take both write locks up front so a rejected fallback leaves no trace.
        let mut modes = self.modes.write();
        let mut fallback = self.fallback.write();

        if modes.contains_key(&id) {
            return Err(ModeError::ModeAlreadyRegistered(id.into_string()));
        }
        if is_fallback && let Some(existing) = fallback.as_ref() {
            return Err(ModeError::FallbackConflict {
                existing: existing.to_string(),
                attempted: id.into_string(),
            });
        }

        if is_fallback {
            *fallback = Some(id.clone());
        }
        debug!(
            mode = %id,
            priority = plugin.config().priority,
            fallback = is_fallback,
            "Mode registered"
        );
        modes.insert(id, plugin);
        Ok(())
    }

    /// Removes a mode. Returns `Ok(false)` if it was not registered.
    pub fn unregister(&self, id: &str) -> Result<bool> {
        let mut modes = self.modes.write();
        let fallback = self.fallback.read();

        if fallback.as_ref().is_some_and(|f| f.as_str() == id) {
            return Err(ModeError::FallbackRequired(id.to_string()));
        }

        let key = ModeId::new(id);
        let removed = modes.remove(&key).is_some();
        if removed {
            self.disabled.write().remove(&key);
            debug!(mode = %id, "Mode unregistered");
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<SharedPlugin> {
        self.modes.read().get(&ModeId::new(id)).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modes.read().contains_key(&ModeId::new(id))
    }

    /// All plugins ordered by priority, then id.
    pub fn all(&self) -> Vec<SharedPlugin> {
        let mut plugins: Vec<SharedPlugin> = self.modes.read().values().cloned().collect();
        plugins.sort_by(|a, b| {
            a.config()
                .priority
                .cmp(&b.config().priority)
                .then_with(|| a.id().cmp(b.id()))
        });
        plugins
    }

    pub fn enabled(&self) -> Vec<SharedPlugin> {
        let all = self.all();
        let disabled = self.disabled.read();
        all.into_iter()
            .filter(|p| !disabled.contains(p.id()))
            .collect()
    }

    pub fn enabled_by_category(&self, category: ModeCategory) -> Vec<SharedPlugin> {
        self.enabled()
            .into_iter()
            .filter(|p| p.config().category == category)
            .collect()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.contains(id) && !self.disabled.read().contains(&ModeId::new(id))
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        if !self.contains(id) {
            return Err(ModeError::ModeNotFound(id.to_string()));
        }
        if !enabled && self.fallback_id().is_some_and(|f| f.as_str() == id) {
            return Err(ModeError::FallbackRequired(id.to_string()));
        }

        let key = ModeId::new(id);
        let mut disabled = self.disabled.write();
        if enabled {
            disabled.remove(&key);
        } else {
            disabled.insert(key);
        }
        debug!(mode = %id, enabled, "Mode availability changed");
        Ok(())
    }

    pub fn fallback_id(&self) -> Option<ModeId> {
        self.fallback.read().clone()
    }

    pub fn fallback(&self) -> Option<SharedPlugin> {
        let id = self.fallback_id()?;
        self.modes.read().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<ModeId> {
        self.all().iter().map(|p| p.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.modes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mode::{KeywordPlugin, ModeDefinition};

    fn plugin(id: &str, priority: u32, category: ModeCategory, fallback: bool) -> SharedPlugin {
        Arc::new(KeywordPlugin::new(&ModeDefinition {
            id: id.into(),
            priority,
            category,
            fallback,
            ..Default::default()
        }))
    }

    #[test]
    fn test_register_and_get() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("planning", 30, ModeCategory::Planning, false))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("planning").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("planning", 30, ModeCategory::Planning, false))
            .unwrap();
        let err = registry
            .register(plugin("planning", 5, ModeCategory::Planning, false))
            .unwrap_err();
        assert!(matches!(err, ModeError::ModeAlreadyRegistered(id) if id == "planning"));
        assert_eq!(registry.get("planning").unwrap().config().priority, 30);
    }

    #[test]
    fn test_second_fallback_rejected() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("general", 1, ModeCategory::General, true))
            .unwrap();
        let err = registry
            .register(plugin("chat", 2, ModeCategory::General, true))
            .unwrap_err();
        assert!(matches!(err, ModeError::FallbackConflict { .. }));
        assert!(!registry.contains("chat"));
        assert_eq!(registry.fallback_id(), Some(ModeId::new("general")));
    }

    #[test]
    fn test_all_sorted_by_priority_then_id() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("zeta", 10, ModeCategory::General, false))
            .unwrap();
        registry
            .register(plugin("alpha", 10, ModeCategory::General, false))
            .unwrap();
        registry
            .register(plugin("general", 1, ModeCategory::General, true))
            .unwrap();

        let ids: Vec<String> = registry.ids().iter().map(|i| i.to_string()).collect();
        assert_eq!(ids, vec!["general", "alpha", "zeta"]);
    }

    #[test]
    fn test_enabled_by_category_skips_disabled() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("planning", 30, ModeCategory::Planning, false))
            .unwrap();
        registry
            .register(plugin("roadmap", 31, ModeCategory::Planning, false))
            .unwrap();
        registry
            .register(plugin("debugging", 10, ModeCategory::Diagnostic, false))
            .unwrap();

        registry.set_enabled("roadmap", false).unwrap();
        let planning = registry.enabled_by_category(ModeCategory::Planning);
        assert_eq!(planning.len(), 1);
        assert_eq!(planning[0].id().as_str(), "planning");
        assert!(!registry.is_enabled("roadmap"));

        registry.set_enabled("roadmap", true).unwrap();
        assert_eq!(registry.enabled_by_category(ModeCategory::Planning).len(), 2);
    }

    #[test]
    fn test_fallback_cannot_be_disabled_or_removed() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("general", 1, ModeCategory::General, true))
            .unwrap();

        assert!(matches!(
            registry.set_enabled("general", false),
            Err(ModeError::FallbackRequired(_))
        ));
        assert!(matches!(
            registry.unregister("general"),
            Err(ModeError::FallbackRequired(_))
        ));
        assert!(registry.fallback().is_some());
    }

    #[test]
    fn test_unregister() {
        let registry = ModeRegistry::new();
        registry
            .register(plugin("planning", 30, ModeCategory::Planning, false))
            .unwrap();

        assert!(registry.unregister("planning").unwrap());
        assert!(!registry.unregister("planning").unwrap());
        assert!(registry.is_empty());
    }
}
