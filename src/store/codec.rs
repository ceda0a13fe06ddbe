//! Serialization gateway between entities and stored bytes.
//!
//! Each repository configures its own codec because the engines use
//! structurally different entity shapes. Codecs must be deterministic:
//! equal logical entities serialize to byte-identical output so content
//! hashing and dedup stay stable.

use crate::error::ClientError;
use crate::store::Entity;

/// Converts entities to/from their stored representation.
pub trait EntityCodec: Send + Sync {
    /// Fails with `ClientError::Serialization` on encoding failure.
    fn serialize(&self, entity: &Entity) -> Result<Vec<u8>, ClientError>;

    /// Fails with `ClientError::Deserialization` on malformed input.
    /// Never silently drops fields.
    fn deserialize(&self, bytes: &[u8]) -> Result<Entity, ClientError>;
}

/// Default codec: JSON with stable field order.
#[derive(Debug, Default)]
pub struct JsonCodec;

impl EntityCodec for JsonCodec {
    fn serialize(&self, entity: &Entity) -> Result<Vec<u8>, ClientError> {
        serde_json::to_vec(entity).map_err(|e| ClientError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Entity, ClientError> {
        serde_json::from_slice(bytes).map_err(|e| ClientError::Deserialization(e.to_string()))
    }
}
