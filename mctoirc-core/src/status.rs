//! Liveness flags shared between the supervisor, its sessions and the host.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BridgeStatus {
    running: AtomicBool,
    connected: AtomicBool,
    sessions_opened: AtomicU64,
}

impl BridgeStatus {
    /// The supervisor loop is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// A session is registered and has not failed yet.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Sessions that got as far as an open connection.
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn session_opened(&self) -> u64 {
        self.sessions_opened.fetch_add(1, Ordering::AcqRel) + 1
    }
}
