//! Pending kick reasons, so the quit that follows a kick is not reported twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long a kick waits for its quit before it is forgotten.
pub const KICK_TTL: Duration = Duration::from_secs(60);

/// Player name to the reason of a kick that has not been followed by its
/// quit yet. Entries older than the TTL count as absent.
pub struct KickLedger {
    ttl: Duration,
    /// Reason and the time it was recorded, keyed by exact player name.
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl Default for KickLedger {
    fn default() -> Self {
        Self::with_ttl(KICK_TTL)
    }
}

impl KickLedger {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Remember a kick. A second kick for the same player replaces the first.
    pub fn record(&self, player: &str, reason: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, at)| now.duration_since(*at) < self.ttl);
        entries.insert(player.to_string(), (reason.to_string(), now));
    }

    /// Remove and return the pending kick reason, if it has not expired.
    pub fn consume(&self, player: &str) -> Option<String> {
        let (reason, at) = self.entries.lock().remove(player)?;
        (at.elapsed() < self.ttl).then_some(reason)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
