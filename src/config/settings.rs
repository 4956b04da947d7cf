use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{ModeError, Result};
use crate::mode::ModeDefinition;
use crate::mode::builtin::builtin_definitions;

pub const CONFIG_FILE_NAME: &str = "modeflow.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub router: RouterConfig,
    pub session: SessionConfig,
    pub events: EventConfig,
    pub modes: Vec<ModeDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            session: SessionConfig::default(),
            events: EventConfig::default(),
            modes: builtin_definitions(),
        }
    }
}

impl EngineConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path).await?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ModeError::Config(e.to_string()))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = self.section_problems();

        let mut seen = HashSet::new();
        for mode in &self.modes {
            errors.extend(mode.problems());
            if !seen.insert(mode.id.as_str()) {
                errors.push(format!("duplicate mode id '{}'", mode.id));
            }
        }

        match self.modes.iter().filter(|m| m.fallback).count() {
            0 => errors.push("exactly one mode must be marked fallback (found none)".into()),
            1 => {}
            n => errors.push(format!(
                "exactly one mode must be marked fallback (found {})",
                n
            )),
        }

        validation_result(errors)
    }

    /// Validates the router, session and event sections only. Engines built
    /// from hand-registered plugins never read `modes`.
    pub(crate) fn validate_sections(&self) -> Result<()> {
        validation_result(self.section_problems())
    }

    fn section_problems(&self) -> Vec<String> {
        let mut errors: Vec<String> = Vec::new();

        if !(0.0..=1.0).contains(&self.router.activation_threshold) {
            errors.push("router.activation_threshold must be between 0.0 and 1.0".into());
        }
        if self.router.scoring_timeout_ms == 0 {
            errors.push("router.scoring_timeout_ms must be greater than 0".into());
        }

        if self.session.history_limit == 0 {
            errors.push("session.history_limit must be greater than 0".into());
        }
        if self.session.deactivation_timeout_ms == 0 {
            errors.push("session.deactivation_timeout_ms must be greater than 0".into());
        }

        if self.session.max_tracked_sessions == 0 {
            errors.push("session.max_tracked_sessions must be greater than 0".into());
        }

        if self.events.channel_capacity == 0 {
            errors.push("events.channel_capacity must be greater than 0".into());
        }

        errors
    }
}

fn validation_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ModeError::Config(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum confidence a non-fallback mode needs to win.
    pub activation_threshold: f64,
    /// Per-plugin scoring budget in milliseconds.
    pub scoring_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            activation_threshold: 0.5,
            scoring_timeout_ms: 250,
        }
    }
}

impl RouterConfig {
    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.scoring_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum history entries kept per caller session.
    pub history_limit: usize,
    /// Upper bound on a plugin's deactivate call.
    pub deactivation_timeout_ms: u64,
    /// Caller sessions kept in memory before idle ones are evicted.
    pub max_tracked_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            deactivation_timeout_ms: 5_000,
            max_tracked_sessions: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn deactivation_timeout(&self) -> Duration {
        Duration::from_millis(self.deactivation_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: crate::events::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
