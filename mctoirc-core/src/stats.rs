//! Server stats report line.
//!
//! The host gathers the numbers; the bridge only formats them and queues
//! the result like any other chat line.

use serde::{Deserialize, Serialize};

/// Prefix of the line sent to IRC.
pub const STATS_PREFIX: &str = "[Server Stats] ";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerStats {
    /// 1, 5 and 15 minute ticks per second, when the server exposes them.
    pub tps: Option<[f64; 3]>,
    /// Process CPU load in `0.0..=1.0`.
    pub cpu_load: Option<f64>,
    pub memory_used_mb: u64,
    pub memory_max_mb: u64,
    pub entities: u64,
    pub players: u64,
}

impl ServerStats {
    /// `TPS: 20.00, 19.98, 19.95 | CPU: 12.50% | Memory: 812/4096MB | Entities: 1200 | Players: 3`
    pub fn summary(&self) -> String {
        let tps = match self.tps {
            Some([a, b, c]) => format!("{a:.2}, {b:.2}, {c:.2}"),
            None => "Unknown".to_string(),
        };
        let cpu = match self.cpu_load {
            Some(load) => format!("{:.2}%", load * 100.0),
            None => "Unknown".to_string(),
        };
        format!(
            "TPS: {tps} | CPU: {cpu} | Memory: {}/{}MB | Entities: {} | Players: {}",
            self.memory_used_mb, self.memory_max_mb, self.entities, self.players
        )
    }

    /// The line queued for IRC.
    pub fn report_line(&self) -> String {
        format!("{STATS_PREFIX}{}", self.summary())
    }
}
