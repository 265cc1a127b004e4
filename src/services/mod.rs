//! Content sources.
//!
//! A [`Source`] turns a remote system into documents. Connectors differ only
//! in how they build their page fetches; all of them paginate through
//! [`fetch_paginated`].

mod http_json;
pub mod paginate;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::SourceResult;
use crate::models::{Config, ContentResult, DataFile};
use crate::store::{DataStore, Namespace};
use crate::utils::Logger;

pub use http_json::HttpJsonSource;
pub use paginate::{Paginated, fetch_paginated, page_stream};

/// A document as delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub data: Value,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// One query of a source. `data` resolves to the query's documents.
pub struct SourceQuery {
    pub id: String,
    pub data: BoxFuture<'static, SourceResult<Vec<RawDocument>>>,
}

impl SourceQuery {
    pub fn new(
        id: impl Into<String>,
        data: impl std::future::Future<Output = SourceResult<Vec<RawDocument>>> + Send + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            data: Box::pin(data),
        }
    }
}

/// What a source sees while building its queries.
pub struct SourceContext<'a> {
    pub logger: Logger,
    pub config: &'a Config,
    /// Documents of sources fetched earlier in the run
    pub store: &'a DataStore,
}

/// A pluggable connector yielding documents and media URLs.
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique id; names the namespace and the destination subdirectory.
    fn id(&self) -> &str;

    /// Build this source's queries.
    async fn fetch(&self, ctx: &SourceContext<'_>) -> SourceResult<Vec<SourceQuery>>;

    /// Turn the fetched namespace into files and media tasks.
    ///
    /// Defaults to one data file per document, named after its id, and no
    /// media.
    fn content(&self, namespace: &Namespace) -> SourceResult<ContentResult> {
        let data_files = namespace
            .documents()
            .map(|doc| DataFile::new(doc.id(), doc.data().clone()))
            .collect();
        Ok(ContentResult::new(data_files, Vec::new()))
    }
}
