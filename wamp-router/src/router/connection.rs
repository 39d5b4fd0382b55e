use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use log::{
    debug,
    info,
};
use tokio::{
    sync::mpsc::{
        UnboundedReceiver,
        UnboundedSender,
        unbounded_channel,
    },
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    core::id::Id,
    message::message::Message,
    router::{
        context::RouterContext,
        session::Session,
        sink::OutgoingReceiver,
    },
};

/// A direct connection made to a router, managed externally in the same process.
///
/// Messages are exchanged without serialization. One task handles the connection's incoming
/// messages in order, so the in-process peer behaves like any remote peer.
pub struct DirectConnection {
    uuid: Uuid,
    session: Id,
    message_tx: Option<UnboundedSender<Message>>,
    outgoing: OutgoingReceiver,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for DirectConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConnection")
            .field("uuid", &self.uuid)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl DirectConnection {
    pub(crate) fn start(
        context: RouterContext,
        session: Arc<Session>,
        outgoing: OutgoingReceiver,
    ) -> Self {
        let uuid = Uuid::new_v4();
        let id = session.id();
        let (message_tx, message_rx) = unbounded_channel();
        info!("Created direct connection {uuid} for session {id}");
        let handle = tokio::spawn(Self::run(uuid, context, session, message_rx));
        Self {
            uuid,
            session: id,
            message_tx: Some(message_tx),
            outgoing,
            handle,
        }
    }

    /// The unique identifier of the connection.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The ID of the router session behind the connection.
    pub fn session_id(&self) -> Id {
        self.session
    }

    /// Sends a message to the router.
    pub fn send(&self, message: Message) -> Result<()> {
        self.message_tx
            .as_ref()
            .ok_or_else(|| Error::msg("direct connection is closed"))?
            .send(message)
            .map_err(|_| Error::msg("direct connection is closed"))
    }

    /// Receives the next message from the router.
    ///
    /// Returns `None` once the session is closed and every queued message was received.
    pub async fn recv(&mut self) -> Option<Message> {
        self.outgoing.recv().await
    }

    /// Receives the next message from the router, if one is queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.outgoing.try_recv()
    }

    /// Closes the connection, tearing the session down.
    pub async fn close(mut self) -> Result<()> {
        self.message_tx.take();
        self.handle.await.map_err(Error::new)
    }

    async fn run(
        uuid: Uuid,
        context: RouterContext,
        session: Arc<Session>,
        mut message_rx: UnboundedReceiver<Message>,
    ) {
        let mut closed_rx = session.closed_rx();
        loop {
            tokio::select! {
                message = message_rx.recv() => {
                    let message = match message {
                        Some(message) => message,
                        None => break,
                    };
                    if let Err(err) = session.clone().handle_message(&context, message).await {
                        debug!("Direct connection {uuid} ended by error: {err:#}");
                        break;
                    }
                }
                _ = closed_rx.recv() => break,
            }
        }
        session.clean_up(&context).await;
        info!("Direct connection {uuid} finished");
    }
}
