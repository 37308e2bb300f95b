//! navmap core - map document types
//!
//! Pure data structures shared by the storage crate and its callers: the
//! map document model, identifiers, the error taxonomy and configuration.
//! No I/O lives here.

pub mod config;
pub mod error;
pub mod identity;
pub mod model;

pub use config::{validate_identifier, RepositoryConfig};
pub use error::{
    CacheError, CacheResult, ConfigError, ErrorKind, Lookup, NavmapError, NavmapResult,
    StoreError, StoreResult,
};
pub use identity::{BeaconId, MapId};
pub use model::{
    Feature, Geometry, MapDocument, MapProperties, Properties, ADDRESS_PROPERTY,
    BEACON_ID_PROPERTY, FEATURE_COLLECTION,
};
