//! Identity types for map documents

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Primary identity of a map document.
///
/// UUIDv7 so ids sort by creation time. Assigned by the caller before the
/// document is persisted and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(Uuid);

impl MapId {
    /// Wrap an existing UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh timestamp-sortable id.
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for MapId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for MapId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Short-range radio identifier carried by a beacon feature.
///
/// This is the secondary lookup key: any beacon id embedded in a map
/// resolves to that map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeaconId(String);

impl BeaconId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BeaconId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BeaconId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for BeaconId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_id_parse_roundtrip() {
        let id = MapId::now_v7();
        let parsed: MapId = id.to_string().parse().expect("valid uuid");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_map_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<MapId>().is_err());
    }

    #[test]
    fn test_map_ids_sort_by_creation() {
        let first = MapId::now_v7();
        let second = MapId::now_v7();
        assert!(first < second);
    }

    #[test]
    fn test_beacon_id_serializes_as_plain_string() {
        let id = BeaconId::new("AA:BB:CC:DD:EE:FF");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");
    }
}
