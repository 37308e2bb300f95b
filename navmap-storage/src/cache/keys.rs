//! Typed cache keys.
//!
//! Both the read and the write path build keys through [`CacheKey`], so the
//! naming scheme lives in exactly one place:
//!
//! - primary entry: `map:<map id>` holding the encoded document
//! - indirection entry: `map:beacon:<beacon id>` holding the primary key

use std::fmt;

use navmap_core::{BeaconId, MapId};

const PRIMARY_PREFIX: &str = "map:";
const BEACON_PREFIX: &str = "map:beacon:";

/// Which of the two entry kinds a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Primary,
    Beacon,
}

/// A cache key. Only constructible through [`primary`](Self::primary) and
/// [`beacon`](Self::beacon).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: KeyKind,
    encoded: String,
}

impl CacheKey {
    /// Key of the entry holding the document itself.
    pub fn primary(id: &MapId) -> Self {
        Self {
            kind: KeyKind::Primary,
            encoded: format!("{}{}", PRIMARY_PREFIX, id),
        }
    }

    /// Key of the indirection entry for a beacon id.
    pub fn beacon(id: &BeaconId) -> Self {
        Self {
            kind: KeyKind::Beacon,
            encoded: format!("{}{}", BEACON_PREFIX, id),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.encoded.as_bytes()
    }

    /// Parse the payload of an indirection entry back into a map id.
    ///
    /// Returns `None` unless the bytes are exactly a primary key.
    pub fn parse_primary(bytes: &[u8]) -> Option<MapId> {
        let text = std::str::from_utf8(bytes).ok()?;
        if text.starts_with(BEACON_PREFIX) {
            return None;
        }
        text.strip_prefix(PRIMARY_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        let id = MapId::now_v7();
        assert_eq!(CacheKey::primary(&id).as_str(), format!("map:{}", id));
        assert_eq!(
            CacheKey::beacon(&BeaconId::new("AA:BB")).as_str(),
            "map:beacon:AA:BB"
        );
    }

    #[test]
    fn test_parse_primary_roundtrip() {
        let id = MapId::now_v7();
        let key = CacheKey::primary(&id);
        assert_eq!(CacheKey::parse_primary(key.as_bytes()), Some(id));
    }

    #[test]
    fn test_parse_primary_rejects_beacon_keys_and_junk() {
        let beacon = CacheKey::beacon(&BeaconId::new("x"));
        assert_eq!(CacheKey::parse_primary(beacon.as_bytes()), None);
        assert_eq!(CacheKey::parse_primary(b"map:not-a-uuid"), None);
        assert_eq!(CacheKey::parse_primary(b"\xff\xfe"), None);
        assert_eq!(CacheKey::parse_primary(b""), None);
    }

    #[test]
    fn test_beacon_and_primary_never_collide() {
        let id = MapId::now_v7();
        let primary = CacheKey::primary(&id);
        let beacon = CacheKey::beacon(&BeaconId::new(id.to_string()));
        assert_ne!(primary, beacon);
        assert_eq!(primary.kind(), KeyKind::Primary);
        assert_eq!(beacon.kind(), KeyKind::Beacon);
    }

    #[test]
    fn test_keys_dedupe_in_hash_set() {
        use std::collections::HashSet;

        let id = MapId::now_v7();
        let keys: HashSet<CacheKey> = [
            CacheKey::primary(&id),
            CacheKey::primary(&id),
            CacheKey::beacon(&BeaconId::new("X")),
            CacheKey::beacon(&BeaconId::new("X")),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);

        let kinds: HashSet<KeyKind> = keys.iter().map(CacheKey::kind).collect();
        assert_eq!(kinds.len(), 2);
    }
}
