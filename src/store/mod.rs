//! In-memory document store.
//!
//! A [`DataStore`] is created fresh for every sync run and owns one
//! [`Namespace`] per source, which in turn owns its [`Document`]s.
//!
//! ```text
//! DataStore
//! └── Namespace "posts"
//!     ├── Document "1"
//!     └── Document "2"
//! ```
//!
//! Lookups fail closed: a missing namespace or document is an error, except
//! for `delete`, which is idempotent on documents.

mod document;
mod namespace;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::StoreError;

pub use document::Document;
pub use namespace::Namespace;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Root of document lifetime for one run.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    namespaces: HashMap<String, Namespace>,
    order: Vec<String>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty namespace. Fails if it already exists.
    pub fn create_namespace(&mut self, id: impl Into<String>) -> StoreResult<&mut Namespace> {
        let id = id.into();
        if self.namespaces.contains_key(&id) {
            return Err(StoreError::NamespaceExists(id));
        }
        self.order.push(id.clone());
        Ok(self
            .namespaces
            .entry(id.clone())
            .or_insert_with(|| Namespace::new(id)))
    }

    /// Create a namespace and bulk-insert `documents`.
    ///
    /// Stops at the first failing insert; the namespace and the documents
    /// inserted before the failure remain.
    pub fn create_namespace_from_map<I>(&mut self, id: impl Into<String>, documents: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let namespace = self.create_namespace(id)?;
        for (doc_id, data) in documents {
            namespace.insert(doc_id, data)?;
        }
        Ok(())
    }

    pub fn has_namespace(&self, id: &str) -> bool {
        self.namespaces.contains_key(id)
    }

    pub fn namespace(&self, id: &str) -> StoreResult<&Namespace> {
        self.namespaces
            .get(id)
            .ok_or_else(|| StoreError::NamespaceNotFound(id.to_string()))
    }

    pub fn namespace_mut(&mut self, id: &str) -> StoreResult<&mut Namespace> {
        self.namespaces
            .get_mut(id)
            .ok_or_else(|| StoreError::NamespaceNotFound(id.to_string()))
    }

    /// Remove a namespace and everything in it.
    pub fn remove_namespace(&mut self, id: &str) -> Option<Namespace> {
        let removed = self.namespaces.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn insert(&mut self, namespace: &str, id: impl Into<String>, data: Value) -> StoreResult<()> {
        self.namespace_mut(namespace)?.insert(id, data)?;
        Ok(())
    }

    pub fn get(&self, namespace: &str, id: &str) -> StoreResult<&Document> {
        self.namespace(namespace)?.get(id)
    }

    /// Upsert a document into an existing namespace.
    pub fn update(&mut self, namespace: &str, id: impl Into<String>, data: Value) -> StoreResult<()> {
        self.namespace_mut(namespace)?.update(id, data);
        Ok(())
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub fn delete(&mut self, namespace: &str, id: &str) -> StoreResult<()> {
        self.namespace_mut(namespace)?.delete(id);
        Ok(())
    }

    /// Lazily enumerate one namespace.
    pub fn documents(&self, namespace: &str) -> StoreResult<impl Iterator<Item = &Document> + '_> {
        Ok(self.namespace(namespace)?.documents())
    }

    /// Lazily enumerate every document as `(namespace id, document)`.
    pub fn all_documents(&self) -> impl Iterator<Item = (&str, &Document)> + '_ {
        self.namespaces().flat_map(|ns| ns.documents().map(move |doc| (ns.id(), doc)))
    }

    /// Namespaces in creation order.
    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> + '_ {
        self.order.iter().filter_map(|id| self.namespaces.get(id))
    }

    /// Total document count across namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.values().map(Namespace::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
