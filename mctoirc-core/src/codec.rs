//! Line codec: inbound IRC lines to events, outbound chat to PRIVMSG lines.
//!
//! Parsing is deliberately narrow. Only `PING` and
//! `:nick!user@host PRIVMSG <target> :<text>` are understood; every other
//! line is [`InboundEvent::Ignored`]. Nothing here returns an error or
//! panics, whatever the input.

use crate::event::{Broadcast, ChannelMessage, InboundEvent, Origin};
use crate::queue::ChatLine;

/// Maximum characters of chat text per PRIVMSG.
pub const MAX_TEXT_CHARS: usize = 400;

/// Appended when text was cut at [`MAX_TEXT_CHARS`].
pub const ELLIPSIS: &str = "...";

/// Escape marker used by the game's color/format codes (`§a`, `§l`, ...).
pub const FORMAT_MARKER: char = '§';

/// Parses and renders lines for one channel.
#[derive(Debug, Clone)]
pub struct LineCodec {
    channel: String,
    relay_nick: Option<String>,
}

impl LineCodec {
    /// `channel` is the only target rendered to and matched against.
    /// `relay_nick` names a bot whose `<user> text` messages are unwrapped;
    /// `None` or an empty nick turns that off.
    pub fn new(channel: impl Into<String>, relay_nick: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            relay_nick: relay_nick.filter(|n| !n.is_empty()),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Parse one raw line (with or without its trailing CRLF).
    pub fn parse(&self, raw: &str) -> InboundEvent {
        let raw = raw.trim_end_matches(['\r', '\n']);

        if let Some(rest) = raw.strip_prefix("PING") {
            let token = rest.strip_prefix(' ').unwrap_or(rest);
            return InboundEvent::Ping {
                token: token.to_string(),
            };
        }

        match self.parse_privmsg(raw) {
            Some(msg) => InboundEvent::ChannelMessage(msg),
            None => InboundEvent::Ignored,
        }
    }

    fn parse_privmsg(&self, raw: &str) -> Option<ChannelMessage> {
        let first_space = raw.find(' ')?;
        let second_space = first_space + 1 + raw[first_space + 1..].find(' ')?;

        let prefix = raw[..first_space].strip_prefix(':')?;
        if &raw[first_space + 1..second_space] != "PRIVMSG" {
            return None;
        }

        let rest = &raw[second_space + 1..];
        let colon = rest.find(':')?;
        let target = rest[..colon].split_whitespace().next()?.to_string();
        let message = sanitize(&rest[colon + 1..]);

        let (nick, _) = prefix.split_once('!')?;
        if nick.is_empty() {
            return None;
        }
        let sender = sanitize(nick);

        if self.relay_nick.as_deref() == Some(sender.as_str()) {
            if let Some((user, body)) = split_relayed(&message) {
                return Some(ChannelMessage {
                    sender: user,
                    target,
                    body,
                    origin: Origin::Relay,
                });
            }
        }

        Some(ChannelMessage {
            sender,
            target,
            body: message,
            origin: Origin::Irc,
        })
    }

    /// Render a chat line as a PRIVMSG for the configured channel.
    pub fn render(&self, line: &ChatLine) -> String {
        let text: String = strip_format_codes(line.text())
            .chars()
            .map(|c| if matches!(c, '\r' | '\n' | '\0') { ' ' } else { c })
            .collect();
        format!("PRIVMSG {} :{}", self.channel, truncate(&text))
    }

    /// Build the host-facing broadcast for a parsed channel message.
    pub fn display(&self, msg: &ChannelMessage) -> Broadcast {
        let tag = match msg.origin {
            Origin::Irc => "§9[IRC]",
            Origin::Relay => "§5[Discord]",
        };
        Broadcast {
            origin: msg.origin,
            sender: msg.sender.clone(),
            body: msg.body.clone(),
            display: format!("{tag} §7<§f{}§7> §f{}", msg.sender, msg.body),
        }
    }
}

/// `<user#1234> body` → `("user", "body")`.
fn split_relayed(message: &str) -> Option<(String, String)> {
    let rest = message.strip_prefix('<')?;
    let end = rest.find('>')?;
    if end == 0 {
        return None;
    }
    let mut user = &rest[..end];
    if let Some(hash) = user.find('#') {
        if hash > 0 {
            user = &user[..hash];
        }
    }
    Some((sanitize(user), rest[end + 1..].trim().to_string()))
}

/// Drop control characters below 0x20, keeping tab, LF, VT, FF and CR.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|&c| c >= ' ' || ('\t'..='\r').contains(&c))
        .collect()
}

/// Remove `§x` color/format pairs.
pub fn strip_format_codes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == FORMAT_MARKER && chars.peek().is_some_and(|&n| is_format_code(n)) {
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

fn is_format_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

/// Cap `text` at [`MAX_TEXT_CHARS`] characters, marking the cut.
pub fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((idx, _)) => format!("{}{ELLIPSIS}", &text[..idx]),
        None => text.to_string(),
    }
}
