//! Bounded outbound queue between host event threads and the session writer.
//!
//! Producers never block: [`OutboundQueue::offer`] drops the newest line
//! when the queue is full. The single consumer lives in the supervisor and
//! is lent to each session in turn, so lines queued while disconnected wait
//! for the next session instead of being lost.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default queue capacity.
pub const QUEUE_CAPACITY: usize = 100;

/// A line of chat destined for IRC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    text: String,
}

impl ChatLine {
    /// Wrap already-formatted text. Rendering to the wire (format-code
    /// stripping, truncation) happens when the line is sent.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Producer side. Cheap to clone; safe to use from any thread.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<ChatLine>,
}

/// Consumer side. Exactly one exists per queue.
pub struct OutboundReceiver {
    rx: mpsc::Receiver<ChatLine>,
    /// A line whose write failed, sent again before anything queued.
    retry: Option<ChatLine>,
}

/// Create a queue with [`QUEUE_CAPACITY`].
pub fn channel() -> (OutboundQueue, OutboundReceiver) {
    with_capacity(QUEUE_CAPACITY)
}

/// Create a queue holding at most `capacity` lines.
pub fn with_capacity(capacity: usize) -> (OutboundQueue, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (OutboundQueue { tx }, OutboundReceiver { rx, retry: None })
}

impl OutboundQueue {
    /// Enqueue without blocking. Returns `false` if the line was dropped.
    pub fn offer(&self, line: ChatLine) -> bool {
        match self.tx.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(line)) => {
                tracing::debug!(text = %line.text(), "outbound queue full, dropping line");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("outbound queue closed, dropping line");
                false
            }
        }
    }

    /// Lines currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most lines the queue holds before `offer` starts dropping.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl OutboundReceiver {
    /// Wait for the next line. `None` once every producer is gone.
    ///
    /// Cancel-safe: a line is only removed when this future completes.
    pub async fn take(&mut self) -> Option<ChatLine> {
        if let Some(line) = self.retry.take() {
            return Some(line);
        }
        self.rx.recv().await
    }

    /// Take a line if one is ready.
    pub fn try_take(&mut self) -> Option<ChatLine> {
        if let Some(line) = self.retry.take() {
            return Some(line);
        }
        self.rx.try_recv().ok()
    }

    /// Put back a line that was taken but could not be written. It is
    /// returned by the next `take` ahead of everything still queued.
    pub fn restore(&mut self, line: ChatLine) {
        self.retry = Some(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn drain(rx: &mut OutboundReceiver) -> Vec<String> {
        std::iter::from_fn(|| rx.try_take())
            .map(|l| l.text().to_string())
            .collect()
    }

    #[test]
    fn fifo_order() {
        let (tx, mut rx) = channel();
        for i in 0..5 {
            assert!(tx.offer(ChatLine::new(format!("line {i}"))));
        }
        assert_eq!(tx.len(), 5);
        assert_eq!(drain(&mut rx), ["line 0", "line 1", "line 2", "line 3", "line 4"]);
        assert!(tx.is_empty());
    }

    #[test]
    fn full_queue_rejects_newest() {
        let (tx, mut rx) = channel();
        for i in 0..QUEUE_CAPACITY {
            assert!(tx.offer(ChatLine::new(i.to_string())));
        }
        assert!(!tx.offer(ChatLine::new("overflow")));
        assert_eq!(tx.len(), QUEUE_CAPACITY);

        let drained = drain(&mut rx);
        assert_eq!(drained.len(), QUEUE_CAPACITY);
        assert_eq!(drained.first().map(String::as_str), Some("0"));
        assert_eq!(drained.last().map(String::as_str), Some("99"));
        assert!(!drained.iter().any(|l| l == "overflow"));
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let (tx, mut rx) = channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let tx = tx.clone();
                let accepted = Arc::clone(&accepted);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        if tx.offer(ChatLine::new(format!("{t}:{i}"))) {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), QUEUE_CAPACITY);
        assert_eq!(drain(&mut rx).len(), QUEUE_CAPACITY);
    }

    #[test]
    fn per_producer_order_is_kept() {
        let (tx, mut rx) = with_capacity(1000);
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        assert!(tx.offer(ChatLine::new(format!("{t}:{i}"))));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let mut last = [-1i32; 4];
        for line in drain(&mut rx) {
            let (t, i) = line.split_once(':').unwrap();
            let (t, i): (usize, i32) = (t.parse().unwrap(), i.parse().unwrap());
            assert!(i > last[t]);
            last[t] = i;
        }
        assert_eq!(last, [99; 4]);
    }

    #[test]
    fn restored_line_comes_first() {
        let (tx, mut rx) = channel();
        tx.offer(ChatLine::new("a"));
        tx.offer(ChatLine::new("b"));
        let a = rx.try_take().unwrap();
        rx.restore(a);
        assert_eq!(drain(&mut rx), ["a", "b"]);
    }

    #[test]
    fn offer_after_receiver_dropped_is_rejected() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.offer(ChatLine::new("late")));
    }

    #[tokio::test]
    async fn take_waits_for_producer() {
        let (tx, mut rx) = channel();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.offer(ChatLine::new("later"))
        });
        let line = tokio::time::timeout(std::time::Duration::from_secs(5), rx.take())
            .await
            .unwrap();
        assert_eq!(line, Some(ChatLine::new("later")));
        assert!(producer.join().unwrap());
        assert_eq!(rx.take().await, None);
    }
}
