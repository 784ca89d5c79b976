//! Bridge configuration.
//!
//! Loaded once at startup from a TOML file and handed to the core by value.
//! The only thing the core ever writes back is `startup.credits`, through
//! [`ConfigStore`], after the startup announcement went out.
//!
//! ```toml
//! [irc]
//! server = "irc.example.net"
//! port = 6667
//! channel = "#example"
//! bot_name = "Example"
//!
//! [startup]
//! enabled = true
//! message = "Example for Example by Example to Example"
//! credits = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Longest nick the bridge will register with.
pub const MAX_BOT_NAME_CHARS: usize = 20;

pub const DEFAULT_SERVER: &str = "irc.example.net";
pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_CHANNEL: &str = "#example";
pub const DEFAULT_BOT_NAME: &str = "Example";
pub const DEFAULT_REALNAME: &str = "Minecraft IRC Bridge";
pub const DEFAULT_STARTUP_MESSAGE: &str = "Example for Example by Example to Example";
pub const DEFAULT_RELAY_NICK: &str = "DiscordBridge";
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub irc: IrcConfig,
    pub startup: StartupConfig,
    /// A player whose join/quit/kick lines get a custom title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vanity: Option<VanityConfig>,
    pub quit: QuitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub channel: String,
    /// Nick and ident. Cut to [`MAX_BOT_NAME_CHARS`] on load.
    pub bot_name: String,
    pub realname: String,
    /// Use TLS. Also enabled implicitly on port 6697.
    pub tls: bool,
    /// Nick of a bot relaying another chat network into the channel as
    /// `<user> text`. Empty disables relay detection.
    pub relay_nick: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            channel: DEFAULT_CHANNEL.to_string(),
            bot_name: DEFAULT_BOT_NAME.to_string(),
            realname: DEFAULT_REALNAME.to_string(),
            tls: false,
            relay_nick: DEFAULT_RELAY_NICK.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Announce in the channel on the first successful connection.
    pub enabled: bool,
    pub message: String,
    /// Set once the announcement has been sent, so it is never repeated.
    pub credits: bool,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message: DEFAULT_STARTUP_MESSAGE.to_string(),
            credits: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VanityConfig {
    pub identity: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuitConfig {
    /// Report a quit that was neither a kick nor a ban as "(Timeout)".
    pub report_timeouts: bool,
}

impl BridgeConfig {
    /// Parse and normalize a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.normalized()
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("can't read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn normalized(mut self) -> Result<Self> {
        self.irc.bot_name = self.irc.bot_name.chars().take(MAX_BOT_NAME_CHARS).collect();
        if self.irc.bot_name.trim().is_empty() {
            return Err(BridgeError::Config("irc.bot_name must not be empty".into()));
        }
        if self.irc.bot_name.contains(char::is_whitespace) {
            return Err(BridgeError::Config("irc.bot_name must not contain whitespace".into()));
        }
        if self.irc.server.trim().is_empty() {
            return Err(BridgeError::Config("irc.server must not be empty".into()));
        }
        if self.irc.channel.is_empty() || self.irc.channel.contains(char::is_whitespace) {
            return Err(BridgeError::Config(format!(
                "invalid irc.channel {:?}",
                self.irc.channel
            )));
        }
        Ok(self)
    }

    /// `host:port` for logging and connecting.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.irc.server, self.irc.port)
    }

    pub fn use_tls(&self) -> bool {
        self.irc.tls || self.irc.port == 6697
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.irc.reconnect_delay_secs)
    }

    pub fn relay_nick(&self) -> Option<String> {
        Some(self.irc.relay_nick.clone()).filter(|n| !n.is_empty())
    }
}

/// Durable storage for the one flag the core writes back.
pub trait ConfigStore: Send + Sync {
    /// Record that the startup announcement has been sent.
    fn mark_credits_sent(&self) -> Result<()>;
}

/// A store that remembers nothing; the announcement repeats every run.
pub struct Ephemeral;

impl ConfigStore for Ephemeral {
    fn mark_credits_sent(&self) -> Result<()> {
        Ok(())
    }
}

/// Persists into the TOML file the config was loaded from, leaving every
/// other key (and unknown keys) untouched.
pub struct TomlConfigFile {
    path: PathBuf,
}

impl TomlConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `config` to the file, creating parent directories.
    pub fn save(&self, config: &BridgeConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.persist_error(e))?;
        }
        std::fs::write(&self.path, config.to_toml_string()?).map_err(|e| self.persist_error(e))
    }

    /// Load the file, writing the defaults first if it does not exist yet.
    pub fn load_or_init(&self) -> Result<BridgeConfig> {
        if self.path.exists() {
            return BridgeConfig::load(&self.path);
        }
        let config = BridgeConfig::default();
        self.save(&config)?;
        tracing::info!(path = %self.path.display(), "wrote default config");
        Ok(config)
    }

    fn persist_error(&self, e: impl std::fmt::Display) -> BridgeError {
        BridgeError::ConfigPersist(format!("{}: {e}", self.path.display()))
    }
}

impl ConfigStore for TomlConfigFile {
    fn mark_credits_sent(&self) -> Result<()> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.persist_error(e)),
        };
        let mut doc: toml::Table = toml::from_str(&text).map_err(|e| self.persist_error(e))?;

        let startup = doc
            .entry("startup")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let Some(startup) = startup.as_table_mut() else {
            return Err(self.persist_error("[startup] is not a table"));
        };
        startup.insert("credits".to_string(), toml::Value::Boolean(true));

        let out = toml::to_string_pretty(&doc).map_err(|e| self.persist_error(e))?;
        std::fs::write(&self.path, out).map_err(|e| self.persist_error(e))
    }
}
