//! Per-handle state kept in the global handle table.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use mctoirc_core::{Bridge, Broadcast, BroadcastSink};

use crate::bridge::callback::CallbackSink;
use crate::bridge::envelope::{EventEnvelope, HostEvent};

/// Forwards broadcasts to whichever callback is subscribed, if any.
#[derive(Default)]
pub struct HostSink {
    /// Shared so dispatch can run without holding the lock.
    callback: Mutex<Option<Arc<CallbackSink>>>,
    /// Last sequence number handed out.
    seq: AtomicU64,
}

impl HostSink {
    /// Replace the subscribed callback.
    pub fn subscribe(&self, sink: CallbackSink) {
        *self.callback.lock() = Some(Arc::new(sink));
    }

    pub fn unsubscribe(&self) {
        self.callback.lock().take();
    }
}

impl BroadcastSink for HostSink {
    fn broadcast(&self, message: &Broadcast) {
        let Some(cb) = self.callback.lock().clone() else {
            tracing::trace!(sender = %message.sender, "no subscriber, broadcast dropped");
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let envelope = EventEnvelope::new(seq, HostEvent::Broadcast(message.clone()));
        match serde_json::to_string(&envelope) {
            Ok(json) => cb.dispatch(&json),
            Err(e) => tracing::warn!(error = %e, "failed to serialize broadcast"),
        }
    }
}

/// One bridge created through `mctoirc_create`.
pub struct HostCore {
    /// Key in the global handle table.
    pub id: u64,
    /// The relay itself. Stopped when the handle is destroyed.
    pub bridge: Bridge,
    /// Also held by `bridge` as its broadcast sink; kept here so the
    /// callback can be swapped after creation.
    pub sink: Arc<HostSink>,
}
