//! Outbound event stream for display and analytics consumers.
//!
//! Publishing is fire-and-forget: with no subscriber attached, events are
//! dropped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::mode::{ModeConfig, ModeId};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// `display.update`: tells a UI which mode is now in charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUpdate {
    pub mode_id: ModeId,
    pub symbol: String,
    pub label: String,
    pub session_id: String,
}

impl DisplayUpdate {
    pub fn for_mode(config: &ModeConfig, session_id: &str) -> Self {
        Self {
            mode_id: config.id.clone(),
            symbol: config.symbol.clone(),
            label: config.name.clone(),
            session_id: session_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    ModeActivation,
    ModeDeactivation,
}

/// `analytics.event`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    #[serde(rename = "type")]
    pub event_type: AnalyticsEventType,
    pub mode_id: ModeId,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl AnalyticsEvent {
    pub fn new(event_type: AnalyticsEventType, mode_id: ModeId, session_id: &str) -> Self {
        Self {
            event_type,
            mode_id,
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum EngineEvent {
    #[serde(rename = "display.update")]
    Display(DisplayUpdate),
    #[serde(rename = "analytics.event")]
    Analytics(AnalyticsEvent),
}

impl EngineEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Display(_) => "display.update",
            Self::Analytics(_) => "analytics.event",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Display(d) => &d.session_id,
            Self::Analytics(a) => &a.session_id,
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that will see the event.
    pub fn publish(&self, event: EngineEvent) -> usize {
        let channel = event.channel();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(channel, "Event dropped: no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscribe_display(&self) -> DisplayReceiver {
        DisplayReceiver {
            inner: self.subscribe(),
        }
    }

    pub fn subscribe_analytics(&self) -> AnalyticsReceiver {
        AnalyticsReceiver {
            inner: self.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once the bus is gone. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event receiver lagged");
                    continue;
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Everything currently buffered, without waiting.
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

pub struct DisplayReceiver {
    inner: EventReceiver,
}

impl DisplayReceiver {
    pub async fn recv(&mut self) -> Option<DisplayUpdate> {
        loop {
            match self.inner.recv().await? {
                EngineEvent::Display(update) => return Some(update),
                EngineEvent::Analytics(_) => continue,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<DisplayUpdate> {
        loop {
            match self.inner.try_recv()? {
                EngineEvent::Display(update) => return Some(update),
                EngineEvent::Analytics(_) => continue,
            }
        }
    }
}

pub struct AnalyticsReceiver {
    inner: EventReceiver,
}

impl AnalyticsReceiver {
    pub async fn recv(&mut self) -> Option<AnalyticsEvent> {
        loop {
            match self.inner.recv().await? {
                EngineEvent::Analytics(event) => return Some(event),
                EngineEvent::Display(_) => continue,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<AnalyticsEvent> {
        loop {
            match self.inner.try_recv()? {
                EngineEvent::Analytics(event) => return Some(event),
                EngineEvent::Display(_) => continue,
            }
        }
    }
}
