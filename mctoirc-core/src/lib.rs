//! Core of a game-chat ⇄ IRC relay.
//!
//! A [`Bridge`] is what the game server embeds. Game events go in through
//! its `emit_*` methods and land in a bounded [`queue`]; a
//! [`supervisor`] keeps exactly one IRC [`session`] alive at a time,
//! reconnecting after a fixed delay forever, and every channel message it
//! reads is handed to the host's [`BroadcastSink`].
//!
//! Only the IRC subset the relay needs is spoken: registration,
//! PING/PONG, PRIVMSG to a single channel and QUIT.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod queue;
pub mod session;
pub mod stats;
pub mod status;
pub mod supervisor;
pub mod transport;

pub use bridge::{Bridge, Emit};
pub use codec::LineCodec;
pub use config::{BridgeConfig, ConfigStore, TomlConfigFile};
pub use error::{BridgeError, Result};
pub use event::{Broadcast, BroadcastSink, ChannelMessage, InboundEvent, Origin};
pub use queue::{ChatLine, OutboundQueue, OutboundReceiver};
pub use stats::ServerStats;
pub use status::BridgeStatus;
