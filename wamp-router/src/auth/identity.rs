/// The identity of an authenticated peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The authentication ID the peer was authenticated as.
    pub id: String,
    /// The authentication role the peer was authenticated for.
    pub role: String,
    /// The authentication method used.
    pub method: String,
}

impl Identity {
    /// The identity given to peers that do not authenticate.
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".to_owned(),
            role: "anonymous".to_owned(),
            method: "anonymous".to_owned(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::anonymous()
    }
}
