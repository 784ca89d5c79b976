//! The object a host embeds: game events in, IRC broadcasts out.
//!
//! Every `emit_*` call formats one line and offers it to the outbound
//! queue. None of them block or touch the network, so they are safe to
//! call from the game's event-dispatch thread.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{BridgeConfig, ConfigStore};
use crate::event::BroadcastSink;
use crate::ledger::KickLedger;
use crate::queue::{self, ChatLine, OutboundQueue, OutboundReceiver};
use crate::session::SessionContext;
use crate::stats::ServerStats;
use crate::status::BridgeStatus;
use crate::supervisor::SessionSupervisor;

/// What happened to an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// A line was queued for IRC.
    Queued,
    /// Nothing to send (a quit already covered by its kick line).
    Suppressed,
    /// The queue was full; the line was dropped.
    Dropped,
}

impl Emit {
    pub fn is_dropped(self) -> bool {
        self == Emit::Dropped
    }
}

/// A started supervisor task and the token that stops it.
struct Running {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// One relay between the game and a single IRC channel.
///
/// Created stopped. Lines emitted before [`Bridge::start`] wait in the
/// queue and go out once the first session registers.
pub struct Bridge {
    /// Config, codec, sink and status shared with every session.
    ctx: Arc<SessionContext>,
    /// Producer side of the outbound queue, used by every `emit_*`.
    queue: OutboundQueue,
    /// Consumer side while no supervisor holds it. Taken by `start`, put
    /// back by the supervisor when it exits.
    receiver: Arc<Mutex<Option<OutboundReceiver>>>,
    /// Kicks waiting for their quit.
    ledger: KickLedger,
    /// Runtime the supervisor is spawned on.
    runtime: Handle,
    /// The current supervisor, if started.
    running: Mutex<Option<Running>>,
}

impl Bridge {
    /// Build a stopped bridge. Call [`Bridge::start`] to connect.
    pub fn new(
        config: BridgeConfig,
        sink: Arc<dyn BroadcastSink>,
        store: Arc<dyn ConfigStore>,
        runtime: Handle,
    ) -> Self {
        let (queue, receiver) = queue::channel();
        let ctx = Arc::new(SessionContext::new(
            config,
            sink,
            store,
            Arc::new(BridgeStatus::default()),
        ));
        Self {
            ctx,
            queue,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            ledger: KickLedger::default(),
            runtime,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.ctx.config
    }

    pub fn status(&self) -> &BridgeStatus {
        &self.ctx.status
    }

    /// Producer handle for anything else that wants to post to the channel.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// Spawn the reconnect loop. Returns `false` if a previous run is still
    /// winding down and the bridge can't start yet.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if let Some(r) = running.as_ref() {
            if !r.shutdown.is_cancelled() && !r.task.is_finished() {
                return true;
            }
        }

        let Some(receiver) = self.receiver.lock().take() else {
            tracing::warn!("bridge is still shutting down, not starting");
            return false;
        };

        let shutdown = CancellationToken::new();
        let supervisor = SessionSupervisor::new(Arc::clone(&self.ctx), receiver, shutdown.clone());
        let slot = Arc::clone(&self.receiver);
        let task = self.runtime.spawn(async move {
            let receiver = supervisor.run().await;
            *slot.lock() = Some(receiver);
        });

        tracing::info!(
            server = %self.ctx.config.server_addr(),
            channel = %self.ctx.config.irc.channel,
            "bridge started"
        );
        *running = Some(Running { shutdown, task });
        true
    }

    /// Ask the reconnect loop to stop without waiting for it.
    pub fn stop(&self) {
        if let Some(r) = self.running.lock().as_ref() {
            r.shutdown.cancel();
        }
    }

    /// Stop and wait until the session has sent QUIT and closed.
    pub async fn shutdown(&self) {
        let running = self.running.lock().take();
        if let Some(Running { shutdown, task }) = running {
            shutdown.cancel();
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "supervisor task failed");
            }
        }
    }

    pub fn emit_chat(&self, player: &str, message: &str) -> Emit {
        self.offer(format!("<{player}> {message}"))
    }

    pub fn emit_join(&self, player: &str) -> Emit {
        let line = match self.vanity_title(player) {
            Some(title) => format!("{title} Has Joined The Game"),
            None => format!("[+] {player} joined the game"),
        };
        self.offer(line)
    }

    /// Report a kick and remember it, so the quit that follows is not
    /// reported a second time.
    /// A kick line that doesn't fit in the queue is not recorded, so the
    /// quit is still reported.
    pub fn emit_kick(&self, player: &str, reason: &str, is_banned: bool) -> Emit {
        let emit = self.offer(self.kick_line(player, reason, is_banned));
        if emit == Emit::Queued {
            self.ledger.record(player, reason);
        }
        emit
    }

    /// Report a player leaving.
    ///
    /// A quit that follows a recorded kick is suppressed. `was_kicked` covers
    /// hosts that only learn about the kick at quit time.
    pub fn emit_quit(
        &self,
        player: &str,
        was_kicked: bool,
        kick_reason: Option<&str>,
        is_banned: bool,
    ) -> Emit {
        if let Some(reason) = self.ledger.consume(player) {
            tracing::debug!(%player, %reason, "quit after kick, already reported");
            return Emit::Suppressed;
        }
        if was_kicked {
            return self.offer(self.kick_line(player, kick_reason.unwrap_or_default(), is_banned));
        }

        let base = match self.vanity_title(player) {
            Some(title) => format!("{title} Has Left The Game"),
            None => format!("[-] {player} left the game"),
        };
        let suffix = if is_banned {
            " (Banned)"
        } else if self.ctx.config.quit.report_timeouts {
            " (Timeout)"
        } else {
            ""
        };
        self.offer(format!("{base}{suffix}"))
    }

    pub fn emit_stats(&self, stats: &ServerStats) -> Emit {
        self.offer(stats.report_line())
    }

    fn kick_line(&self, player: &str, reason: &str, is_banned: bool) -> String {
        let mut line = match self.vanity_title(player) {
            Some(title) => format!("{title} Has Been Kicked"),
            None => format!("[-] {player} was kicked"),
        };
        if !reason.is_empty() {
            line.push_str(": ");
            line.push_str(reason);
        }
        if is_banned {
            line.push_str(" (Banned)");
        }
        line
    }

    fn vanity_title(&self, player: &str) -> Option<&str> {
        self.ctx
            .config
            .vanity
            .as_ref()
            .filter(|v| v.identity.eq_ignore_ascii_case(player))
            .map(|v| v.title.as_str())
    }

    fn offer(&self, text: String) -> Emit {
        if self.queue.offer(ChatLine::new(text)) {
            Emit::Queued
        } else {
            Emit::Dropped
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
