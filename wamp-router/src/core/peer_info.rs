use std::fmt::Display;

/// The type of connection a peer is communicating over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionType {
    /// Connection to a remote address, as reported by the transport.
    Remote(String),
    /// In-process connection.
    Direct,
}

impl Default for ConnectionType {
    fn default() -> Self {
        Self::Remote(String::default())
    }
}

impl Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(address) => write!(f, "remote({address})"),
            Self::Direct => f.write_str("direct"),
        }
    }
}
