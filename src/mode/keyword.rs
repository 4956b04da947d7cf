//! Data-driven keyword plugin.
//!
//! Every built-in mode is an instance of [`KeywordPlugin`] configured by a
//! [`ModeDefinition`]; modes differ only in their tables and weights.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::plugin::{ActiveSessions, ModePlugin};
use super::types::{ConfidenceScore, ModeCategory, ModeConfig, ModeContext, ModeId, ModeResult};
use crate::error::{ModeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Confidence before any signal is seen.
    pub base: f64,
    /// Added per distinct keyword hit.
    pub keyword: f64,
    /// Added per trigger phrase hit.
    pub trigger: f64,
    /// Added when the mode handled the previous turn and matched again.
    pub continuity: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 0.1,
            keyword: 0.25,
            trigger: 0.3,
            continuity: 0.1,
        }
    }
}

/// Recommends another mode when any of its keywords appear in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub keywords: Vec<String>,
    pub to: String,
}

/// Configuration-file shape of a mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeDefinition {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub category: ModeCategory,
    pub keywords: Vec<String>,
    pub triggers: Vec<String>,
    pub priority: u32,
    pub timeout_ms: u64,
    pub max_concurrent_sessions: usize,
    pub fallback: bool,
    pub enabled: bool,
    /// `{topic}` is replaced with the matched focus terms.
    pub suggestions: Vec<String>,
    pub weights: ScoringWeights,
    pub handoffs: Vec<Handoff>,
}

impl Default for ModeDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            symbol: "•".to_string(),
            description: String::new(),
            category: ModeCategory::General,
            keywords: Vec::new(),
            triggers: Vec::new(),
            priority: 50,
            timeout_ms: 30_000,
            max_concurrent_sessions: 10,
            fallback: false,
            enabled: true,
            suggestions: Vec::new(),
            weights: ScoringWeights::default(),
            handoffs: Vec::new(),
        }
    }
}

impl ModeDefinition {
    pub fn to_config(&self) -> ModeConfig {
        let name = if self.name.is_empty() { &self.id } else { &self.name };
        let mut config = ModeConfig::new(ModeId::new(&self.id), name.clone())
            .with_category(self.category)
            .with_symbol(self.symbol.clone())
            .with_priority(self.priority)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_concurrent_sessions(self.max_concurrent_sessions);
        if self.fallback {
            config = config.as_fallback();
        }
        config.description = self.description.clone();
        config.keywords = self.keywords.iter().map(|k| k.to_lowercase()).collect();
        config.triggers = self.triggers.iter().map(|t| t.to_lowercase()).collect();
        config
    }

    /// Problems with this definition, empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let label = if self.id.is_empty() { "<unnamed>" } else { &self.id };

        if self.id.trim().is_empty() {
            problems.push("mode id must not be empty".to_string());
        }
        if self.timeout_ms == 0 {
            problems.push(format!("mode '{}': timeout_ms must be greater than 0", label));
        }
        if self.max_concurrent_sessions == 0 {
            problems.push(format!(
                "mode '{}': max_concurrent_sessions must be greater than 0",
                label
            ));
        }
        let w = &self.weights;
        for (name, value) in [
            ("base", w.base),
            ("keyword", w.keyword),
            ("trigger", w.trigger),
            ("continuity", w.continuity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!(
                    "mode '{}': weights.{} must be between 0.0 and 1.0",
                    label, name
                ));
            }
        }
        if self.fallback && !self.enabled {
            problems.push(format!("mode '{}': fallback mode must be enabled", label));
        }
        problems
    }
}

/// Lower-cased word tokens plus the normalized text they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Tokens {
    pub words: Vec<String>,
    pub normalized: String,
}

impl Tokens {
    pub fn from_input(input: &str) -> Self {
        let words: Vec<String> = input
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        let normalized = words.join(" ");
        Self { words, normalized }
    }

    fn contains_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn contains_phrase(&self, phrase: &str) -> bool {
        if phrase.contains(' ') {
            format!(" {} ", self.normalized).contains(&format!(" {} ", phrase))
        } else {
            self.contains_word(phrase)
        }
    }
}

/// Which of the mode's tables matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    pub keywords: BTreeSet<String>,
    pub triggers: BTreeSet<String>,
    pub continuing: bool,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.triggers.is_empty()
    }

    pub fn focus_terms(&self) -> Vec<String> {
        self.triggers
            .iter()
            .chain(self.keywords.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    fn from_signal_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 | 2 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Final pipeline stage before a result is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub focus: Vec<String>,
    pub intensity: Intensity,
    pub handoff: Option<ModeId>,
}

pub struct KeywordPlugin {
    config: ModeConfig,
    weights: ScoringWeights,
    suggestions: Vec<String>,
    handoffs: Vec<Handoff>,
    active: ActiveSessions,
}

impl KeywordPlugin {
    pub fn new(definition: &ModeDefinition) -> Self {
        Self {
            config: definition.to_config(),
            weights: definition.weights,
            suggestions: definition.suggestions.clone(),
            handoffs: definition.handoffs.clone(),
            active: ActiveSessions::new(),
        }
    }

    fn is_active_for(&self, session_id: &str) -> bool {
        self.active.contains(session_id)
    }

    fn signals(&self, tokens: &Tokens, ctx: &ModeContext) -> Signals {
        let keywords = self
            .config
            .keywords
            .iter()
            .filter(|k| tokens.contains_phrase(k))
            .cloned()
            .collect();
        let triggers = self
            .config
            .triggers
            .iter()
            .filter(|t| tokens.contains_phrase(t))
            .cloned()
            .collect();
        Signals {
            keywords,
            triggers,
            continuing: ctx.previous_mode.as_ref() == Some(&self.config.id),
        }
    }

    fn confidence(&self, signals: &Signals) -> f64 {
        let mut value = self.weights.base
            + self.weights.keyword * signals.keywords.len() as f64
            + self.weights.trigger * signals.triggers.len() as f64;
        if signals.continuing && !signals.is_empty() {
            value += self.weights.continuity;
        }
        value
    }

    fn assess(&self, tokens: &Tokens, signals: &Signals) -> Assessment {
        let handoff = self
            .handoffs
            .iter()
            .find(|h| h.keywords.iter().any(|k| tokens.contains_phrase(&k.to_lowercase())))
            .map(|h| ModeId::new(&h.to));

        Assessment {
            focus: signals.focus_terms(),
            intensity: Intensity::from_signal_count(signals.keywords.len() + signals.triggers.len()),
            handoff,
        }
    }

    fn render_suggestions(&self, assessment: &Assessment) -> Vec<String> {
        let topic = if assessment.focus.is_empty() {
            "your request".to_string()
        } else {
            assessment.focus.join(", ")
        };
        self.suggestions
            .iter()
            .map(|s| s.replace("{topic}", &topic))
            .collect()
    }
}

#[async_trait]
impl ModePlugin for KeywordPlugin {
    fn config(&self) -> &ModeConfig {
        &self.config
    }

    async fn score(&self, ctx: &ModeContext) -> Result<ConfidenceScore> {
        let tokens = Tokens::from_input(&ctx.input);
        let signals = self.signals(&tokens, ctx);

        let mut reasons = vec![format!("base confidence {:.2}", self.weights.base)];
        if !signals.keywords.is_empty() {
            reasons.push(format!(
                "matched keywords: {}",
                signals.keywords.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        for trigger in &signals.triggers {
            reasons.push(format!("matched trigger '{}'", trigger));
        }
        if signals.continuing && !signals.is_empty() {
            reasons.push("continuing from previous turn".to_string());
        }

        Ok(ConfidenceScore::new(self.config.id.clone(), self.confidence(&signals))
            .with_reasons(reasons))
    }

    async fn activate(&self, ctx: &ModeContext) -> Result<()> {
        if !self.active.insert(&ctx.session_id) {
            debug!(mode = %self.config.id, session = %ctx.session_id, "Mode already active for session");
        }
        Ok(())
    }

    async fn process(&self, ctx: &ModeContext) -> Result<ModeResult> {
        if !self.is_active_for(&ctx.session_id) {
            return Err(ModeError::plugin(
                self.config.id.as_str(),
                format!("session '{}' is not active", ctx.session_id),
            ));
        }
        let tokens = Tokens::from_input(&ctx.input);
        let signals = self.signals(&tokens, ctx);
        let assessment = self.assess(&tokens, &signals);

        let summary = if assessment.focus.is_empty() {
            format!("{} engaged", self.config.name)
        } else {
            format!(
                "{} engaged on: {}",
                self.config.name,
                assessment.focus.join(", ")
            )
        };

        let output = json!({
            "mode": self.config.id,
            "summary": summary,
            "focus": assessment.focus,
            "intensity": assessment.intensity,
            "word_count": tokens.words.len(),
        });

        let mut result =
            ModeResult::success(output).with_suggestions(self.render_suggestions(&assessment));
        if let Some(next) = assessment.handoff {
            result = result.with_next_mode(next);
        }
        Ok(result)
    }

    async fn deactivate(&self, session_id: &str) -> Result<()> {
        if !self.active.remove(session_id) {
            debug!(mode = %self.config.id, session = %session_id, "Deactivate ignored: session not active");
        }
        Ok(())
    }
}
