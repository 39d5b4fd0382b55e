use anyhow::{
    Error,
    Result,
};

use crate::{
    core::error::InteractionError,
    message::message::Message,
    serializer::serializer::{
        Serializer,
        SerializerType,
    },
};

/// A serializer implemented for MessagePack.
#[derive(Debug, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::MessagePack
    }

    fn serialize(&self, value: &Message) -> Result<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(Error::new)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        rmp_serde::from_slice(bytes)
            .map_err(|err| InteractionError::ProtocolViolation(err.to_string()).into())
    }
}
