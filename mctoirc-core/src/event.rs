//! Events produced by the read loop and handed to the host.

use serde::Serialize;

/// Where a channel message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Said directly on IRC.
    Irc,
    /// Relayed into IRC by another bridge bot (e.g. a Discord bridge),
    /// with the real author extracted from the `<user> body` form.
    Relay,
}

/// A PRIVMSG addressed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub sender: String,
    pub target: String,
    pub body: String,
    pub origin: Origin,
}

/// Result of parsing one raw inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Server keepalive. `token` is everything after `PING `, sent back verbatim.
    Ping { token: String },

    /// A channel message.
    ChannelMessage(ChannelMessage),

    /// Anything else: numerics, JOIN/PART noise, malformed lines.
    Ignored,
}

/// A channel message ready for display to the game's audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Broadcast {
    pub origin: Origin,
    pub sender: String,
    pub body: String,
    /// Rendered display string, including the game's color codes.
    pub display: String,
}

/// Receives every channel message seen on IRC.
///
/// Called from the session task; implementations should hand the message
/// off to their own thread rather than do slow work inline.
pub trait BroadcastSink: Send + Sync {
    fn broadcast(&self, message: &Broadcast);
}

impl<F> BroadcastSink for F
where
    F: Fn(&Broadcast) + Send + Sync,
{
    fn broadcast(&self, message: &Broadcast) {
        self(message)
    }
}
