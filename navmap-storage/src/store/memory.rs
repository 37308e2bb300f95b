//! In-memory document store.
//!
//! Keeps documents in insertion order so "first match" is deterministic.
//! Used by tests and by single-process deployments that only need the cache
//! semantics.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use navmap_core::{MapDocument, StoreError, StoreResult};

use super::traits::{DocumentFilter, DocumentStore, ElementMatch, IndexSpec};

#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<Vec<MapDocument>>,
    indexes: RwLock<HashMap<String, IndexSpec>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Specs of every index ensured so far.
    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.indexes
            .read()
            .map(|i| i.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove all documents and indexes.
    pub fn clear(&self) {
        if let Ok(mut documents) = self.documents.write() {
            documents.clear();
        }
        if let Ok(mut indexes) = self.indexes.write() {
            indexes.clear();
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        let mut indexes = self.indexes.write().map_err(|_| StoreError::LockPoisoned)?;
        match indexes.get(&spec.name) {
            Some(existing) if existing != spec => Err(StoreError::Index {
                index_name: spec.name.clone(),
                reason: format!(
                    "exists with different definition ({:?} on {})",
                    existing.kind, existing.field
                ),
            }),
            Some(_) => Ok(()),
            None => {
                indexes.insert(spec.name.clone(), spec.clone());
                Ok(())
            }
        }
    }

    async fn insert_one(&self, doc: &MapDocument) -> StoreResult<()> {
        let mut documents = self.documents.write().map_err(|_| StoreError::LockPoisoned)?;
        if documents.iter().any(|d| d.id == doc.id) {
            return Err(StoreError::DuplicateId { id: doc.id });
        }
        documents.push(doc.clone());
        Ok(())
    }

    async fn find_one(&self, filter: &DocumentFilter) -> StoreResult<Option<MapDocument>> {
        let documents = self.documents.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(documents.iter().find(|d| filter.matches(d)).cloned())
    }

    async fn find_one_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        let documents = self.documents.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(documents.iter().find(|d| element.matches(d)).cloned())
    }

    async fn find_one_and_delete_by_element(
        &self,
        element: &ElementMatch,
    ) -> StoreResult<Option<MapDocument>> {
        let mut documents = self.documents.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(documents
            .iter()
            .position(|d| element.matches(d))
            .map(|pos| documents.remove(pos)))
    }
}
