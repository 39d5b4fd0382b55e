use crate::{
    auth::Identity,
    core::{
        id::Id,
        invocation_policy::InvocationPolicy,
        match_style::MatchStyle,
        roles::PeerRole,
        uri::{
            Uri,
            WildcardUri,
        },
    },
};

/// A read-only view of the router's realms.
#[derive(Debug, Default, Clone)]
pub struct RouterSnapshot {
    pub realms: Vec<RealmSnapshot>,
}

impl RouterSnapshot {
    /// Looks up a realm by URI.
    pub fn realm(&self, uri: &str) -> Option<&RealmSnapshot> {
        self.realms.iter().find(|realm| realm.uri.as_ref() == uri)
    }
}

/// A read-only view of a realm.
#[derive(Debug, Clone)]
pub struct RealmSnapshot {
    pub uri: Uri,
    /// Configured realms are never garbage collected.
    pub persistent: bool,
    pub sessions: Vec<SessionSnapshot>,
    pub subscriptions: Vec<SubscriptionSnapshot>,
    pub registrations: Vec<RegistrationSnapshot>,
    pub pending_invocations: usize,
}

/// A session joined to a realm.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: Id,
    pub identity: Identity,
    pub roles: Vec<PeerRole>,
    /// Outgoing messages not yet taken by the transport.
    pub queued_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub id: Id,
    pub topic: WildcardUri,
    pub match_style: MatchStyle,
    pub subscribers: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSnapshot {
    pub id: Id,
    pub procedure: Uri,
    pub invocation_policy: InvocationPolicy,
    pub callees: Vec<Id>,
}
