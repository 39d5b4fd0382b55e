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

/// A serializer implemented for JavaScript Object Notation.
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::Json
    }

    fn serialize(&self, value: &Message) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(Error::new)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        serde_json::from_slice(bytes)
            .map_err(|err| InteractionError::ProtocolViolation(err.to_string()).into())
    }
}
