use anyhow::Result;
use async_trait::async_trait;

use crate::{
    auth::identity::Identity,
    core::{
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
};

/// Decides the identity of a peer joining a realm.
///
/// Called once per session with the HELLO details. An error aborts the session with
/// `wamp.error.authorization_failed`, unless the error already carries a WAMP error URI.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticates the peer for the realm.
    async fn authenticate(&self, realm: &Uri, details: &Dictionary) -> Result<Identity>;
}

/// An authenticator that admits every peer.
///
/// An `authid` given in the HELLO details is honored as-is; everything else is anonymous.
#[derive(Debug, Default)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(&self, _: &Uri, details: &Dictionary) -> Result<Identity> {
        let mut identity = Identity::anonymous();
        if let Some(Value::String(id)) = details.get("authid") {
            identity.id = id.clone();
        }
        Ok(identity)
    }
}
