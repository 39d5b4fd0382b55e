mod json;
mod message_pack;
mod serializer;

pub use json::JsonSerializer;
pub use message_pack::MessagePackSerializer;
pub use serializer::{
    Serializer,
    SerializerType,
    new_serializer,
};
