//! Durable document stores.
//!
//! The store is the source of truth. Stores must give "first match"
//! results in a stable order and apply find-and-delete atomically.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use memory::InMemoryDocumentStore;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresDocumentStore, PostgresStoreConfig};
pub use traits::{
    DocumentFilter, DocumentStore, ElementMatch, IndexKind, IndexSpec, FEATURES_FIELD,
};
