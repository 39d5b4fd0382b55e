pub mod permissions;
pub mod pub_sub;
pub mod rpc;

use crate::{
    auth::Identity,
    core::{
        id::Id,
        uri::Uri,
    },
};

/// The session a policy check is made for.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    /// The realm the session belongs to.
    pub realm: &'a Uri,
    /// The session ID.
    pub session: Id,
    /// The authenticated identity of the session.
    pub identity: &'a Identity,
}
