//! Reconnect loop: one session at a time, a fixed delay between attempts,
//! no attempt limit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::queue::OutboundReceiver;
use crate::session::{ConnectionSession, SessionContext, SessionEnd};

/// Owns the outbound queue's receiver for as long as it runs and lends it
/// to one session at a time.
pub struct SessionSupervisor {
    /// Shared with every session it opens.
    ctx: Arc<SessionContext>,
    /// Survives sessions, so lines queued during an outage are kept.
    queue: OutboundReceiver,
    /// Stops the loop, including a pending connect or backoff sleep.
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    /// Nothing happens until [`SessionSupervisor::run`] is awaited.
    pub fn new(ctx: Arc<SessionContext>, queue: OutboundReceiver, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            queue,
            shutdown,
        }
    }

    /// Run until `shutdown` fires. Hands the queue receiver back so a later
    /// supervisor can continue with whatever is still queued.
    pub async fn run(mut self) -> OutboundReceiver {
        let status = Arc::clone(&self.ctx.status);
        let delay = self.ctx.config.reconnect_delay();
        let server = self.ctx.config.server_addr();
        status.set_running(true);

        let mut attempt: u64 = 0;
        while !self.shutdown.is_cancelled() {
            attempt += 1;
            match self.run_once().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::PeerClosed) => {
                    tracing::info!(%server, attempt, "server closed the connection")
                }
                Err(e) => tracing::warn!(%server, attempt, error = %e, "IRC session failed"),
            }
            if self.shutdown.is_cancelled() {
                break;
            }

            tracing::info!(delay_secs = delay.as_secs_f64(), "reconnecting after backoff");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        status.set_connected(false);
        status.set_running(false);
        tracing::info!(%server, "IRC supervisor stopped");
        self.queue
    }

    async fn run_once(&mut self) -> Result<SessionEnd> {
        let mut session = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            opened = ConnectionSession::open(Arc::clone(&self.ctx)) => opened?,
        };
        let n = self.ctx.status.session_opened();
        tracing::debug!(session = n, "connection open, registering");

        let registered = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            r = session.register() => Some(r),
        };
        let result = match registered {
            None => Ok(SessionEnd::Shutdown),
            Some(Err(e)) => Err(e),
            Some(Ok(())) => session.run(&mut self.queue, &self.shutdown).await,
        };
        session.close().await;
        result
    }
}
