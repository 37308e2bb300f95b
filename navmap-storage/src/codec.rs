//! Cache value encoding.

use navmap_core::{CacheResult, MapDocument};

/// Turns documents into cache values and back.
///
/// Decoding failures are cache failures: the repository treats them as a miss
/// and goes to the store.
pub trait Codec: Send + Sync {
    fn encode(&self, document: &MapDocument) -> CacheResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> CacheResult<MapDocument>;
}

/// JSON codec, the same encoding the store and HTTP layer use.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, document: &MapDocument) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(document)?)
    }

    fn decode(&self, bytes: &[u8]) -> CacheResult<MapDocument> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
