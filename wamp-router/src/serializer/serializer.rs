use std::fmt::{
    Debug,
    Display,
};

use anyhow::{
    Error,
    Result,
};

use crate::{
    core::{
        error::BasicError,
        uri::Uri,
    },
    message::message::Message,
    serializer::{
        json::JsonSerializer,
        message_pack::MessagePackSerializer,
    },
};

/// The wire encoding negotiated for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializerType {
    /// JavaScript Object Notation.
    Json,
    /// MessagePack.
    MessagePack,
}

impl SerializerType {
    /// Every supported serializer, in order of preference.
    pub fn all() -> [Self; 2] {
        [Self::Json, Self::MessagePack]
    }

    /// The protocol URI used during protocol negotiation.
    pub fn uri(&self) -> Uri {
        Uri::from_known(self.uri_str())
    }

    fn uri_str(&self) -> &'static str {
        match self {
            Self::Json => "wamp.2.json",
            Self::MessagePack => "wamp.2.msgpack",
        }
    }
}

impl Display for SerializerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.uri_str())
    }
}

impl TryFrom<&str> for SerializerType {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::all()
            .into_iter()
            .find(|serializer| serializer.uri_str() == value)
            .ok_or_else(|| {
                BasicError::InvalidArgument(format!("unsupported serializer: {value}")).into()
            })
    }
}

/// Encodes and decodes WAMP messages for a transport.
///
/// Does not implement message batching.
pub trait Serializer: Send + Sync + Debug {
    /// The type of the serializer.
    fn serializer_type(&self) -> SerializerType;

    /// Serializes the given message to bytes.
    fn serialize(&self, value: &Message) -> Result<Vec<u8>>;

    /// Deserializes bytes to a message.
    fn deserialize(&self, bytes: &[u8]) -> Result<Message>;
}

/// Creates a new [`Serializer`] for the given type.
pub fn new_serializer(serializer_type: SerializerType) -> Box<dyn Serializer> {
    match serializer_type {
        SerializerType::Json => Box::new(JsonSerializer),
        SerializerType::MessagePack => Box::new(MessagePackSerializer),
    }
}
