use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FailureKind, ModeFailure};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ModeId(String);

impl ModeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ModeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeCategory {
    Analytical,
    Planning,
    Creative,
    Diagnostic,
    Social,
    Reflective,
    #[default]
    General,
}

impl ModeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Planning => "planning",
            Self::Creative => "creative",
            Self::Diagnostic => "diagnostic",
            Self::Social => "social",
            Self::Reflective => "reflective",
            Self::General => "general",
        }
    }
}

impl fmt::Display for ModeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a mode, fixed once the plugin is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub id: ModeId,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub category: ModeCategory,
    /// Owned by the plugin; the engine never inspects these.
    pub keywords: Vec<String>,
    pub triggers: Vec<String>,
    /// Lower value wins ties during routing.
    pub priority: u32,
    pub timeout_ms: u64,
    pub max_concurrent_sessions: usize,
    pub fallback: bool,
}

impl ModeConfig {
    pub fn new(id: impl Into<ModeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            symbol: "•".to_string(),
            description: String::new(),
            category: ModeCategory::General,
            keywords: Vec::new(),
            triggers: Vec::new(),
            priority: 50,
            timeout_ms: 30_000,
            max_concurrent_sessions: 10,
            fallback: false,
        }
    }

    pub fn with_category(mut self, category: ModeCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Read-only view of one unit of user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeContext {
    pub session_id: String,
    pub input: String,
    pub previous_mode: Option<ModeId>,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl ModeContext {
    pub fn new(session_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            input: input.into(),
            previous_mode: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_previous_mode(mut self, mode: Option<ModeId>) -> Self {
        self.previous_mode = mode;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub mode_id: ModeId,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

impl ConfidenceScore {
    /// Clamps into [0, 1]; NaN becomes 0.
    pub fn new(mode_id: impl Into<ModeId>, confidence: f64) -> Self {
        Self {
            mode_id: mode_id.into(),
            confidence: clamp_confidence(confidence),
            reasoning: Vec::new(),
        }
    }

    pub fn zero(mode_id: impl Into<ModeId>, reason: impl Into<String>) -> Self {
        Self::new(mode_id, 0.0).with_reason(reason)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasoning.push(reason.into());
        self
    }

    pub fn with_reasons(mut self, reasons: impl IntoIterator<Item = String>) -> Self {
        self.reasoning.extend(reasons);
        self
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeResult {
    pub success: bool,
    pub mode_id: Option<ModeId>,
    pub output: Value,
    pub suggestions: Vec<String>,
    /// Advisory only; the engine never switches modes on its own.
    pub next_mode: Option<ModeId>,
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub error: Option<ModeFailure>,
    pub metadata: HashMap<String, Value>,
}

impl ModeResult {
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            success: true,
            mode_id: None,
            output: output.into(),
            suggestions: Vec::new(),
            next_mode: None,
            confidence: 0.0,
            processing_time_ms: 0,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: ModeFailure) -> Self {
        Self {
            success: false,
            mode_id: None,
            output: Value::Null,
            suggestions: Vec::new(),
            next_mode: None,
            confidence: 0.0,
            processing_time_ms: 0,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    pub fn with_mode(mut self, mode_id: ModeId) -> Self {
        self.mode_id = Some(mode_id);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_next_mode(mut self, next: impl Into<ModeId>) -> Self {
        self.next_mode = Some(next.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time_ms = duration_ms(elapsed);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn error_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
