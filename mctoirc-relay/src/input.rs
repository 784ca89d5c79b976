//! Game events read from stdin, one JSON object per line.
//!
//! ```text
//! {"event":"chat","player":"Steve","message":"hi"}
//! {"event":"join","player":"Steve"}
//! {"event":"kick","player":"Steve","reason":"Griefing","is_banned":true}
//! {"event":"quit","player":"Steve","is_banned":true}
//! {"event":"stats","tps":[20.0,19.9,19.8],"players":3}
//! ```

use serde::Deserialize;

use mctoirc_core::{Bridge, Emit, ServerStats};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    Chat {
        player: String,
        message: String,
    },
    Join {
        player: String,
    },
    Quit {
        player: String,
        #[serde(default)]
        was_kicked: bool,
        #[serde(default)]
        kick_reason: Option<String>,
        #[serde(default)]
        is_banned: bool,
    },
    Kick {
        player: String,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        is_banned: bool,
    },
    Stats(ServerStats),
}

impl GameEvent {
    /// `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> serde_json::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }

    pub fn apply(&self, bridge: &Bridge) -> Emit {
        match self {
            GameEvent::Chat { player, message } => bridge.emit_chat(player, message),
            GameEvent::Join { player } => bridge.emit_join(player),
            GameEvent::Quit {
                player,
                was_kicked,
                kick_reason,
                is_banned,
            } => bridge.emit_quit(player, *was_kicked, kick_reason.as_deref(), *is_banned),
            GameEvent::Kick {
                player,
                reason,
                is_banned,
            } => bridge.emit_kick(player, reason, *is_banned),
            GameEvent::Stats(stats) => bridge.emit_stats(stats),
        }
    }
}
