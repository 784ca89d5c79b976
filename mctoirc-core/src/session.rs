//! One live IRC connection: registration, read loop and queue drain.
//!
//! A session moves `Connecting → Registering → Active → Closed` and never
//! comes back from `Closed`; the supervisor builds a fresh one instead.
//! The read loop and the drain loop are branches of a single `select!`, so
//! PONG replies and queued chat share the writer without locking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::codec::LineCodec;
use crate::config::{BridgeConfig, ConfigStore};
use crate::error::Result;
use crate::event::{BroadcastSink, InboundEvent};
use crate::queue::{ChatLine, OutboundReceiver};
use crate::status::BridgeStatus;
use crate::transport::{self, BoxedReader, BoxedWriter};

/// Sent with QUIT when the bridge is stopped.
pub const QUIT_REASON: &str = "Bridge shutting down";

/// Everything a session needs that outlives it.
pub struct SessionContext {
    pub config: BridgeConfig,
    pub codec: LineCodec,
    pub sink: Arc<dyn BroadcastSink>,
    pub store: Arc<dyn ConfigStore>,
    pub status: Arc<BridgeStatus>,
    credits_sent: AtomicBool,
}

impl SessionContext {
    pub fn new(
        config: BridgeConfig,
        sink: Arc<dyn BroadcastSink>,
        store: Arc<dyn ConfigStore>,
        status: Arc<BridgeStatus>,
    ) -> Self {
        let codec = LineCodec::new(config.irc.channel.clone(), config.relay_nick());
        let credits_sent = AtomicBool::new(config.startup.credits);
        Self {
            config,
            codec,
            sink,
            store,
            status,
            credits_sent,
        }
    }

    pub fn credits_sent(&self) -> bool {
        self.credits_sent.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registering,
    Active,
    Closed,
}

/// How an active session ended without an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested (or every producer went away).
    Shutdown,
    /// The server closed the stream.
    PeerClosed,
}

pub struct ConnectionSession<R, W> {
    reader: R,
    writer: W,
    ctx: Arc<SessionContext>,
    state: SessionState,
    line_buf: Vec<u8>,
}

impl ConnectionSession<BoxedReader, BoxedWriter> {
    /// Connect to the configured server.
    pub async fn open(ctx: Arc<SessionContext>) -> Result<Self> {
        tracing::debug!(state = ?SessionState::Connecting, server = %ctx.config.server_addr(), "opening session");
        let (reader, writer) = transport::connect(&ctx.config).await?.into_split();
        Ok(Self::new(reader, writer, ctx))
    }
}

impl<R, W> ConnectionSession<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open stream pair. The session starts in `Registering`.
    pub fn new(reader: R, writer: W, ctx: Arc<SessionContext>) -> Self {
        Self {
            reader,
            writer,
            ctx,
            state: SessionState::Registering,
            line_buf: Vec::with_capacity(512),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send NICK, USER and JOIN, plus the one-time startup announcement.
    pub async fn register(&mut self) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let irc = &ctx.config.irc;

        self.send(&format!("NICK {}", irc.bot_name)).await?;
        self.send(&format!("USER {} 0 * :{}", irc.bot_name, irc.realname))
            .await?;
        self.send(&format!("JOIN {}", irc.channel)).await?;
        self.announce().await?;

        self.state = SessionState::Active;
        ctx.status.set_connected(true);
        tracing::info!(server = %ctx.config.server_addr(), channel = %irc.channel, nick = %irc.bot_name, "registered");
        Ok(())
    }

    async fn announce(&mut self) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let startup = &ctx.config.startup;
        if !startup.enabled || startup.message.is_empty() {
            return Ok(());
        }
        if ctx.credits_sent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let line = ctx.codec.render(&ChatLine::new(startup.message.as_str()));
        if let Err(e) = self.send(&line).await {
            ctx.credits_sent.store(false, Ordering::Release);
            return Err(e);
        }

        let store = Arc::clone(&ctx.store);
        match tokio::task::spawn_blocking(move || store.mark_credits_sent()).await {
            Ok(Ok(())) => tracing::debug!("startup announcement recorded"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "startup announcement sent but not recorded; it may repeat next start")
            }
            Err(e) => tracing::warn!(error = %e, "credits persistence task failed"),
        }
        Ok(())
    }

    /// Run the read and drain loops until shutdown, EOF or an I/O error.
    ///
    /// Lines are taken from `queue` only while this session is active; a
    /// line whose write fails is restored to the queue.
    pub async fn run(
        &mut self,
        queue: &mut OutboundReceiver,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd> {
        let result = self.pump(queue, shutdown).await;
        self.ctx.status.set_connected(false);
        self.state = SessionState::Closed;
        result
    }

    async fn pump(
        &mut self,
        queue: &mut OutboundReceiver,
        shutdown: &CancellationToken,
    ) -> Result<SessionEnd> {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    if let Err(e) = self.send(&format!("QUIT :{QUIT_REASON}")).await {
                        tracing::debug!(error = %e, "QUIT not delivered");
                    }
                    return Ok(SessionEnd::Shutdown);
                }

                read = self.reader.read_until(b'\n', &mut self.line_buf) => {
                    if read? == 0 {
                        return Ok(SessionEnd::PeerClosed);
                    }
                    let raw = String::from_utf8_lossy(&self.line_buf).into_owned();
                    self.line_buf.clear();
                    self.handle_line(&raw).await?;
                }

                next = queue.take() => {
                    let Some(line) = next else {
                        return Ok(SessionEnd::Shutdown);
                    };
                    let rendered = self.ctx.codec.render(&line);
                    if let Err(e) = self.send(&rendered).await {
                        queue.restore(line);
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn handle_line(&mut self, raw: &str) -> Result<()> {
        match self.ctx.codec.parse(raw) {
            InboundEvent::Ping { token } => {
                self.send(&format!("PONG {token}")).await?;
            }
            InboundEvent::ChannelMessage(msg) => {
                if msg.target.eq_ignore_ascii_case(self.ctx.codec.channel()) {
                    let broadcast = self.ctx.codec.display(&msg);
                    self.ctx.sink.broadcast(&broadcast);
                } else {
                    tracing::trace!(target_channel = %msg.target, "message for another target ignored");
                }
            }
            InboundEvent::Ignored => {}
        }
        Ok(())
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Best-effort teardown. Secondary errors are ignored.
    pub async fn close(&mut self) {
        self.state = SessionState::Closed;
        self.ctx.status.set_connected(false);
        let _ = self.writer.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

    use crate::error::BridgeError;
    use crate::event::{Broadcast, Origin};
    use crate::queue;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingStore {
        marks: AtomicUsize,
        fail: bool,
    }

    impl ConfigStore for RecordingStore {
        fn mark_credits_sent(&self) -> Result<()> {
            self.marks.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BridgeError::ConfigPersist("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        ctx: Arc<SessionContext>,
        store: Arc<RecordingStore>,
        seen: Arc<Mutex<Vec<Broadcast>>>,
    }

    fn harness(config: BridgeConfig, fail_persist: bool) -> Harness {
        let store = Arc::new(RecordingStore {
            marks: AtomicUsize::new(0),
            fail: fail_persist,
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = Arc::new(move |b: &Broadcast| sink_seen.lock().push(b.clone()));
        let ctx = Arc::new(SessionContext::new(
            config,
            sink,
            store.clone(),
            Arc::new(BridgeStatus::default()),
        ));
        Harness { ctx, store, seen }
    }

    fn test_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.irc.channel = "#test".to_string();
        config.irc.bot_name = "McBridge".to_string();
        config.startup.message = "hello from the bridge".to_string();
        config
    }

    type Session = ConnectionSession<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

    /// A session wired to an in-memory server: returns the session, the
    /// server's line reader and the server's writer.
    fn pipe(
        ctx: &Arc<SessionContext>,
    ) -> (
        Session,
        Lines<BufReader<ReadHalf<DuplexStream>>>,
        WriteHalf<DuplexStream>,
    ) {
        let (client, server) = tokio::io::duplex(8192);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);
        (
            ConnectionSession::new(BufReader::new(cr), cw, Arc::clone(ctx)),
            BufReader::new(sr).lines(),
            sw,
        )
    }

    async fn next_line(lines: &mut Lines<BufReader<ReadHalf<DuplexStream>>>) -> String {
        tokio::time::timeout(TIMEOUT, lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("stream closed")
    }

    #[tokio::test]
    async fn registers_then_announces_once() {
        let h = harness(test_config(), false);

        let (mut session, mut server, _sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(h.ctx.status.is_connected());
        assert_eq!(next_line(&mut server).await, "NICK McBridge");
        assert_eq!(next_line(&mut server).await, "USER McBridge 0 * :Minecraft IRC Bridge");
        assert_eq!(next_line(&mut server).await, "JOIN #test");
        assert_eq!(next_line(&mut server).await, "PRIVMSG #test :hello from the bridge");
        assert_eq!(h.store.marks.load(Ordering::SeqCst), 1);
        assert!(h.ctx.credits_sent());

        // A later session with the same context does not repeat it.
        let (mut again, mut server, mut sw) = pipe(&h.ctx);
        again.register().await.unwrap();
        assert_eq!(next_line(&mut server).await, "NICK McBridge");
        assert_eq!(next_line(&mut server).await, "USER McBridge 0 * :Minecraft IRC Bridge");
        assert_eq!(next_line(&mut server).await, "JOIN #test");
        sw.write_all(b"PING :x\r\n").await.unwrap();
        let (_tx, mut rx) = queue::channel();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(async move { again.run(&mut rx, &shutdown).await });
        assert_eq!(next_line(&mut server).await, "PONG :x");
        assert_eq!(h.store.marks.load(Ordering::SeqCst), 1);
        run.abort();
    }

    #[tokio::test]
    async fn no_announcement_when_already_credited_or_disabled() {
        for (enabled, credits) in [(true, true), (false, false)] {
            let mut config = test_config();
            config.startup.enabled = enabled;
            config.startup.credits = credits;
            let h = harness(config, false);

            let (mut session, mut server, mut sw) = pipe(&h.ctx);
            session.register().await.unwrap();
            for _ in 0..3 {
                next_line(&mut server).await;
            }
            sw.write_all(b"PING :probe\r\n").await.unwrap();
            let (_tx, mut rx) = queue::channel();
            let shutdown = CancellationToken::new();
            let run = tokio::spawn(async move { session.run(&mut rx, &shutdown).await });
            assert_eq!(next_line(&mut server).await, "PONG :probe");
            assert_eq!(h.store.marks.load(Ordering::SeqCst), 0);
            run.abort();
        }
    }

    #[tokio::test]
    async fn persistence_failure_is_not_fatal() {
        let h = harness(test_config(), true);
        let (mut session, mut server, _sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        for _ in 0..4 {
            next_line(&mut server).await;
        }
        assert_eq!(h.store.marks.load(Ordering::SeqCst), 1);
        assert!(h.ctx.status.is_connected());
    }

    #[tokio::test]
    async fn answers_ping_and_broadcasts_channel_messages() {
        let mut config = test_config();
        config.startup.enabled = false;
        let h = harness(config, false);
        let (mut session, mut server, mut sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        for _ in 0..3 {
            next_line(&mut server).await;
        }

        let (_tx, mut rx) = queue::channel();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(async move { session.run(&mut rx, &shutdown).await });

        sw.write_all(b":irc.test 001 McBridge :Welcome\r\n").await.unwrap();
        sw.write_all(b":bob!u@h PRIVMSG #other :not for us\r\n").await.unwrap();
        sw.write_all(b":bob!u@h PRIVMSG #TEST :hello\r\n").await.unwrap();
        sw.write_all(b":DiscordBridge!u@h PRIVMSG #test :<alice#1234> hi there\n")
            .await
            .unwrap();
        sw.write_all(b"PING :abc123\r\n").await.unwrap();
        assert_eq!(next_line(&mut server).await, "PONG :abc123");

        let seen = h.seen.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].sender, "bob");
        assert_eq!(seen[0].body, "hello");
        assert_eq!(seen[0].origin, Origin::Irc);
        assert_eq!(seen[1].sender, "alice");
        assert_eq!(seen[1].body, "hi there");
        assert_eq!(seen[1].display, "§5[Discord] §7<§falice§7> §fhi there");
        run.abort();
    }

    #[tokio::test]
    async fn non_utf8_input_does_not_end_the_session() {
        let mut config = test_config();
        config.startup.enabled = false;
        let h = harness(config, false);
        let (mut session, mut server, mut sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        for _ in 0..3 {
            next_line(&mut server).await;
        }

        let (_tx, mut rx) = queue::channel();
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(async move { session.run(&mut rx, &shutdown).await });

        sw.write_all(b":bob!u@h PRIVMSG #test :caf\xe9\r\n").await.unwrap();
        sw.write_all(b"PING :still-here\r\n").await.unwrap();
        assert_eq!(next_line(&mut server).await, "PONG :still-here");
        assert_eq!(h.seen.lock()[0].body, "caf\u{FFFD}");
        run.abort();
    }

    #[tokio::test]
    async fn drains_queue_in_order() {
        let mut config = test_config();
        config.startup.enabled = false;
        let h = harness(config, false);
        let (mut session, mut server, _sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        for _ in 0..3 {
            next_line(&mut server).await;
        }

        let (tx, mut rx) = queue::channel();
        tx.offer(ChatLine::new("<Steve> hi"));
        tx.offer(ChatLine::new("[+] Alex joined the game"));
        let shutdown = CancellationToken::new();
        let run = tokio::spawn(async move { session.run(&mut rx, &shutdown).await });

        assert_eq!(next_line(&mut server).await, "PRIVMSG #test :<Steve> hi");
        assert_eq!(next_line(&mut server).await, "PRIVMSG #test :[+] Alex joined the game");
        tx.offer(ChatLine::new("§clate"));
        assert_eq!(next_line(&mut server).await, "PRIVMSG #test :late");
        run.abort();
    }

    #[tokio::test]
    async fn shutdown_sends_quit() {
        let mut config = test_config();
        config.startup.enabled = false;
        let h = harness(config, false);
        let (mut session, mut server, _sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        for _ in 0..3 {
            next_line(&mut server).await;
        }

        let (_tx, mut rx) = queue::channel();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let end = session.run(&mut rx, &shutdown).await.unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!h.ctx.status.is_connected());
        assert_eq!(next_line(&mut server).await, format!("QUIT :{QUIT_REASON}"));
    }

    #[tokio::test]
    async fn peer_close_ends_session() {
        let mut config = test_config();
        config.startup.enabled = false;
        let h = harness(config, false);
        let (mut session, server, sw) = pipe(&h.ctx);
        session.register().await.unwrap();
        drop(server);
        drop(sw);

        let (_tx, mut rx) = queue::channel();
        let shutdown = CancellationToken::new();
        let end = tokio::time::timeout(TIMEOUT, session.run(&mut rx, &shutdown))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, SessionEnd::PeerClosed);
        assert!(!h.ctx.status.is_connected());
    }

    #[tokio::test]
    async fn failed_write_keeps_line_for_next_session() {
        let mut config = test_config();
        config.startup.enabled = false;
        let h = harness(config, false);

        // Reads stay pending (peer kept alive); writes hit a closed pipe.
        let (read_client, _read_server) = tokio::io::duplex(1024);
        let (write_client, write_server) = tokio::io::duplex(1024);
        drop(write_server);
        let mut session = ConnectionSession::new(BufReader::new(read_client), write_client, Arc::clone(&h.ctx));

        let (tx, mut rx) = queue::channel();
        tx.offer(ChatLine::new("first"));
        tx.offer(ChatLine::new("second"));
        let shutdown = CancellationToken::new();
        let result = tokio::time::timeout(TIMEOUT, session.run(&mut rx, &shutdown))
            .await
            .unwrap();
        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert_eq!(session.state(), SessionState::Closed);

        assert_eq!(rx.try_take(), Some(ChatLine::new("first")));
        assert_eq!(rx.try_take(), Some(ChatLine::new("second")));
    }

    #[tokio::test]
    async fn failed_registration_does_not_mark_connected() {
        let h = harness(test_config(), false);
        let (read_client, _read_server) = tokio::io::duplex(1024);
        let (write_client, write_server) = tokio::io::duplex(1024);
        drop(write_server);
        let mut session = ConnectionSession::new(BufReader::new(read_client), write_client, Arc::clone(&h.ctx));

        assert!(session.register().await.is_err());
        assert_eq!(session.state(), SessionState::Registering);
        assert!(!h.ctx.status.is_connected());
        assert!(!h.ctx.credits_sent());
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }
}
