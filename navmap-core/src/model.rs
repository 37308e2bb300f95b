//! Map document model
//!
//! A map is a GeoJSON-style feature collection. The only part of the schema
//! this crate interprets is the beacon id property on features; geometry and
//! every other property are carried opaquely.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::{BeaconId, MapId};

/// Feature property key holding a beacon's radio identifier.
pub const BEACON_ID_PROPERTY: &str = "bluetoothID";

/// Document type tag written by the map editor.
pub const FEATURE_COLLECTION: &str = "FeatureCollection";

/// Map-level property holding the street address of the mapped building.
pub const ADDRESS_PROPERTY: &str = "address";

/// Free-form JSON object used for feature properties and map metadata.
pub type Properties = Map<String, Value>;

/// A stored indoor map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    pub id: MapId,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub properties: MapProperties,
    /// Rendering order is significant; lookup ignores it.
    pub features: Vec<Feature>,
}

impl MapDocument {
    /// Create an empty feature collection with the given id.
    pub fn new(id: MapId) -> Self {
        Self {
            id,
            doc_type: FEATURE_COLLECTION.to_string(),
            properties: MapProperties::default(),
            features: Vec::new(),
        }
    }

    pub fn with_creator(mut self, creator_id: impl Into<String>) -> Self {
        self.properties.creator_id = Some(creator_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Beacon ids of every feature that carries one, in feature order.
    ///
    /// Duplicates are kept: two features with the same id yield it twice.
    pub fn beacon_ids(&self) -> impl Iterator<Item = BeaconId> + '_ {
        self.features.iter().filter_map(Feature::beacon_id)
    }

    /// Whether any feature carries exactly this beacon id.
    pub fn contains_beacon(&self, beacon_id: &BeaconId) -> bool {
        self.features
            .iter()
            .any(|f| f.beacon_id_str() == Some(beacon_id.as_str()))
    }
}

/// Map-level properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapProperties {
    /// Identity of the user who created the map.
    #[serde(rename = "creatorId", default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    /// Everything else (address, azimuth, ...).
    #[serde(flatten)]
    pub metadata: Properties,
}

/// One drawable object of a map: wall, door, beacon, stairs, point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    #[serde(default)]
    pub properties: Properties,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            feature_type: "Feature".to_string(),
            properties: Properties::new(),
            geometry,
        }
    }

    /// A beacon point feature as the map editor emits it.
    pub fn beacon(beacon_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self::new(Geometry::point(x, y))
            .with_property("objectType", "beacon")
            .with_property(BEACON_ID_PROPERTY, beacon_id.into())
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The beacon id of this feature, if it has a string-valued one.
    pub fn beacon_id(&self) -> Option<BeaconId> {
        self.beacon_id_str().map(BeaconId::from)
    }

    fn beacon_id_str(&self) -> Option<&str> {
        self.properties.get(BEACON_ID_PROPERTY).and_then(Value::as_str)
    }
}

/// Geometry payload. Coordinates are never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Value,
    /// Non-standard members such as `bounds`/`direction` on stairs.
    #[serde(flatten)]
    pub extra: Properties,
}

impl Geometry {
    pub fn new(kind: impl Into<String>, coordinates: Value) -> Self {
        Self {
            kind: kind.into(),
            coordinates,
            extra: Properties::new(),
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new("Point", serde_json::json!([x, y]))
    }

    pub fn line(from: (f64, f64), to: (f64, f64)) -> Self {
        Self::new("LineString", serde_json::json!([[from.0, from.1], [to.0, to.1]]))
    }
}
