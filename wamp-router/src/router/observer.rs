use log::debug;

use crate::{
    core::id::Id,
    message::message::Message,
};

/// Watches messages flowing through the router.
///
/// Observers are called synchronously on the routing path, so they must be cheap.
pub trait MessageObserver: Send + Sync {
    /// Called for every message received from a session, before it is handled.
    fn on_ingress(&self, _session: Id, _message: &Message) {}

    /// Called for every message queued to a session.
    fn on_egress(&self, _session: Id, _message: &Message) {}
}

/// An observer that logs all traffic at debug level.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl MessageObserver for LoggingObserver {
    fn on_ingress(&self, session: Id, message: &Message) {
        debug!("rx session {session}: {message:?}");
    }

    fn on_egress(&self, session: Id, message: &Message) {
        debug!("tx session {session}: {message:?}");
    }
}
