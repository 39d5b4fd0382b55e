use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        AtomicUsize,
        Ordering,
    },
};

use log::{
    debug,
    warn,
};
use tokio::sync::{
    RwLock,
    mpsc::{
        UnboundedReceiver,
        UnboundedSender,
        unbounded_channel,
    },
};

use crate::{
    core::id::Id,
    message::message::Message,
    router::observer::MessageObserver,
};

/// The outgoing message queue of a session.
///
/// The queue is unbounded so that routing never waits on a slow peer. Its depth is tracked, and
/// crossing the configured limit is reported once per saturation episode.
pub struct SessionSink {
    session: Id,
    tx: RwLock<Option<UnboundedSender<Message>>>,
    depth: Arc<AtomicUsize>,
    limit: usize,
    saturated: AtomicBool,
    observers: Arc<[Arc<dyn MessageObserver>]>,
}

impl SessionSink {
    pub(crate) fn new(
        session: Id,
        limit: usize,
        observers: Arc<[Arc<dyn MessageObserver>]>,
    ) -> (Self, OutgoingReceiver) {
        let (tx, rx) = unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                session,
                tx: RwLock::new(Some(tx)),
                depth: depth.clone(),
                limit,
                saturated: AtomicBool::new(false),
                observers,
            },
            OutgoingReceiver { rx, depth },
        )
    }

    /// Queues a message for the peer.
    ///
    /// Messages sent after the sink is closed are dropped.
    pub async fn send(&self, message: Message) {
        let tx = self.tx.read().await;
        let tx = match tx.as_ref() {
            Some(tx) => tx,
            None => {
                debug!(
                    "Dropping {} message for closed session {}",
                    message.message_name(),
                    self.session
                );
                return;
            }
        };
        for observer in self.observers.iter() {
            observer.on_egress(self.session, &message);
        }
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(err) = tx.send(message) {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            debug!(
                "Outgoing receiver for session {} is gone, dropping {} message",
                self.session,
                err.0.message_name()
            );
            return;
        }
        if depth > self.limit {
            if !self.saturated.swap(true, Ordering::Relaxed) {
                warn!(
                    "Outgoing queue for session {} is saturated ({depth} messages queued)",
                    self.session
                );
            }
        } else {
            self.saturated.store(false, Ordering::Relaxed);
        }
    }

    /// Closes the sink.
    ///
    /// The receiver yields every message queued before closing, then ends.
    pub async fn close(&self) {
        self.tx.write().await.take();
    }

    /// Number of messages queued but not yet taken by the transport.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Checks if the queue depth exceeds the configured limit.
    pub fn saturated(&self) -> bool {
        self.depth() > self.limit
    }
}

/// The transport end of a session's outgoing queue.
#[derive(Debug)]
pub struct OutgoingReceiver {
    rx: UnboundedReceiver<Message>,
    depth: Arc<AtomicUsize>,
}

impl OutgoingReceiver {
    /// Receives the next outgoing message.
    ///
    /// Returns `None` once the session is closed and every queued message was taken.
    pub async fn recv(&mut self) -> Option<Message> {
        let message = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(message)
    }

    /// Takes the next outgoing message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        let message = self.rx.try_recv().ok()?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(message)
    }

    /// Number of messages queued.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}
