//! Document store trait and query predicates.

use async_trait::async_trait;
use navmap_core::{BeaconId, MapDocument, MapId, StoreResult, BEACON_ID_PROPERTY};
use serde_json::{json, Value};

/// Document field holding the feature sequence.
pub const FEATURES_FIELD: &str = "features";

/// Kind of index a store should maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Planar spatial index over geometry.
    Spatial2d,
    /// Index serving containment (array-element) lookups.
    Containment,
}

/// Description of an index to ensure. Stores create it if missing and
/// accept an identical existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub name: String,
    pub field: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn spatial_2d(field: &str) -> Self {
        Self {
            name: format!("{}_2d", field),
            field: field.to_string(),
            kind: IndexKind::Spatial2d,
        }
    }

    pub fn containment(field: &str) -> Self {
        Self {
            name: format!("{}_containment", field),
            field: field.to_string(),
            kind: IndexKind::Containment,
        }
    }
}

/// Exact-match predicate over whole documents.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    /// Matches every document.
    Any,
    /// Matches the document with this primary id.
    Id(MapId),
    /// Matches documents whose map-level property `key` equals `value`.
    Metadata { key: String, value: Value },
}

impl DocumentFilter {
    pub fn matches(&self, doc: &MapDocument) -> bool {
        match self {
            DocumentFilter::Any => true,
            DocumentFilter::Id(id) => doc.id == *id,
            DocumentFilter::Metadata { key, value } => {
                doc.properties.metadata.get(key) == Some(value)
            }
        }
    }
}

/// Array-element predicate: a document matches when *any* element of its
/// feature sequence has `properties[property] == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMatch {
    pub property: String,
    pub value: Value,
}

impl ElementMatch {
    pub fn new(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Features carrying this beacon id.
    pub fn beacon(id: &BeaconId) -> Self {
        Self::new(BEACON_ID_PROPERTY, id.as_str())
    }

    pub fn matches(&self, doc: &MapDocument) -> bool {
        doc.features
            .iter()
            .any(|f| f.properties.get(&self.property) == Some(&self.value))
    }

    /// JSON containment pattern for the feature array:
    /// `[{"properties": {<property>: <value>}}]`.
    pub fn containment_pattern(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(self.property.clone(), self.value.clone());
        json!([{ "properties": properties }])
    }
}

/// Durable document store.
///
/// "First match" means first in insertion order; stores keep that order
/// stable so repeated queries agree.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the index if it does not exist. Idempotent.
    async fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()>;

    /// Insert a new document. Fails on a duplicate id.
    async fn insert_one(&self, doc: &MapDocument) -> StoreResult<()>;

    /// First document matching the filter.
    async fn find_one(&self, filter: &DocumentFilter) -> StoreResult<Option<MapDocument>>;

    /// First document with a feature matching the element predicate.
    async fn find_one_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>>;

    /// Atomically remove and return the first document matching the element
    /// predicate.
    async fn find_one_and_delete_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_core::{Feature, Geometry};

    fn doc_with(features: Vec<Feature>) -> MapDocument {
        features
            .into_iter()
            .fold(MapDocument::new(MapId::now_v7()), |doc, f| doc.with_feature(f))
    }

    #[test]
    fn test_element_match_any_feature() {
        let doc = doc_with(vec![
            Feature::new(Geometry::point(0.0, 0.0)).with_property("objectType", "door"),
            Feature::beacon("b-2", 1.0, 1.0),
        ]);
        assert!(ElementMatch::beacon(&BeaconId::new("b-2")).matches(&doc));
        assert!(!ElementMatch::beacon(&BeaconId::new("b-3")).matches(&doc));
    }

    #[test]
    fn test_element_match_compares_json_values() {
        let doc = doc_with(vec![
            Feature::new(Geometry::point(0.0, 0.0)).with_property(BEACON_ID_PROPERTY, 7)
        ]);
        assert!(!ElementMatch::beacon(&BeaconId::new("7")).matches(&doc));
        assert!(ElementMatch::new(BEACON_ID_PROPERTY, 7).matches(&doc));
    }

    #[test]
    fn test_containment_pattern_shape() {
        let pattern = ElementMatch::beacon(&BeaconId::new("AA")).containment_pattern();
        assert_eq!(pattern, json!([{ "properties": { "bluetoothID": "AA" } }]));
    }

    #[test]
    fn test_document_filter() {
        let doc = MapDocument::new(MapId::now_v7()).with_metadata("address", "Main st. 1");
        assert!(DocumentFilter::Any.matches(&doc));
        assert!(DocumentFilter::Id(doc.id).matches(&doc));
        assert!(!DocumentFilter::Id(MapId::now_v7()).matches(&doc));
        assert!(DocumentFilter::Metadata {
            key: "address".to_string(),
            value: json!("Main st. 1"),
        }
        .matches(&doc));
    }

    #[test]
    fn test_index_spec_names() {
        assert_eq!(IndexSpec::spatial_2d(FEATURES_FIELD).name, "features_2d");
        assert_eq!(
            IndexSpec::containment(FEATURES_FIELD).kind,
            IndexKind::Containment
        );
    }
}
