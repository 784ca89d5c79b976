//! JSON shape of everything passed to the host callback.

use serde::Serialize;

use mctoirc_core::Broadcast;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HostEvent {
    /// A channel message for the game's players.
    Broadcast(Broadcast),
}

/// `version` is bumped on breaking changes to the JSON; `seq` counts up
/// per bridge handle so the host can spot gaps.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub event: HostEvent,
}

impl EventEnvelope {
    pub fn new(seq: u64, event: HostEvent) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}
