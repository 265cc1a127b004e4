//! Documents of one source, keyed by id in insertion order.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::Value;

use super::Document;
use crate::error::StoreError;

/// The documents belonging to one source within a run.
///
/// Ids are unique. Enumeration follows insertion order so that documents
/// are persisted in the order their pages were fetched.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    id: String,
    documents: HashMap<String, Document>,
    order: Vec<String>,
}

impl Namespace {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// Insert a new document. Fails if the id is taken.
    pub fn insert(&mut self, id: impl Into<String>, data: Value) -> Result<&Document, StoreError> {
        match self.documents.entry(id.into()) {
            Entry::Occupied(entry) => Err(StoreError::DocumentExists {
                namespace: self.id.clone(),
                id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let id = entry.key().clone();
                self.order.push(id.clone());
                Ok(&*entry.insert(Document::new(id, data)))
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<&Document, StoreError> {
        self.documents.get(id).ok_or_else(|| StoreError::DocumentNotFound {
            namespace: self.id.clone(),
            id: id.to_string(),
        })
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Document, StoreError> {
        let namespace = &self.id;
        self.documents
            .get_mut(id)
            .ok_or_else(|| StoreError::DocumentNotFound {
                namespace: namespace.clone(),
                id: id.to_string(),
            })
    }

    /// Insert or replace.
    pub fn update(&mut self, id: impl Into<String>, data: Value) -> &Document {
        match self.documents.entry(id.into()) {
            Entry::Occupied(entry) => {
                let doc = entry.into_mut();
                doc.update(data);
                &*doc
            }
            Entry::Vacant(entry) => {
                let id = entry.key().clone();
                self.order.push(id.clone());
                &*entry.insert(Document::new(id, data))
            }
        }
    }

    /// Remove a document. Removing a missing id is a no-op.
    pub fn delete(&mut self, id: &str) -> Option<Document> {
        let removed = self.documents.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Documents in insertion order. Call again to restart.
    pub fn documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }

    /// Mutable documents in insertion order, for in-place `apply`.
    pub fn documents_mut(&mut self) -> impl Iterator<Item = &mut Document> + '_ {
        let mut by_id: HashMap<&str, &mut Document> = self
            .documents
            .iter_mut()
            .map(|(id, doc)| (id.as_str(), doc))
            .collect();
        let ordered: Vec<&mut Document> = self
            .order
            .iter()
            .filter_map(|id| by_id.remove(id.as_str()))
            .collect();
        ordered.into_iter()
    }
}
