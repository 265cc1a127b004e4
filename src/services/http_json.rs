// src/services/http_json.rs

//! Generic paginated JSON endpoint source.
//!
//! Requests `url` with `{offset}` and `{limit}` substituted, picks the item
//! array out of the body with `items_path` and keys every item by
//! `id_field`. Without an `{offset}` placeholder only one page is fetched.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{RawDocument, Source, SourceContext, SourceQuery, fetch_paginated};
use crate::error::{SourceError, SourceResult};
use crate::models::{ContentResult, DataFile, MediaDownload, SourceConfig};
use crate::store::Namespace;
use crate::transform::PathExpr;

/// Source backed by a paginated JSON HTTP endpoint.
pub struct HttpJsonSource {
    config: Arc<SourceConfig>,
    client: Client,
    items_path: PathExpr,
    media_paths: Vec<PathExpr>,
}

impl HttpJsonSource {
    pub fn new(config: SourceConfig, client: Client) -> SourceResult<Self> {
        let parse = |path: &str| {
            PathExpr::parse(path).map_err(|e| SourceError::config(e.to_string()))
        };
        let items_path = parse(&config.items_path)?;
        let media_paths = config
            .media_paths
            .iter()
            .map(|p| parse(p))
            .collect::<SourceResult<Vec<_>>>()?;

        Ok(Self {
            config: Arc::new(config),
            client,
            items_path,
            media_paths,
        })
    }

    fn page_url(config: &SourceConfig, offset: usize, limit: usize) -> String {
        config
            .url
            .replace("{offset}", &offset.to_string())
            .replace("{limit}", &limit.to_string())
    }

    /// Fetch one page. `None` once the endpoint has nothing more.
    async fn fetch_page(
        client: &Client,
        config: &SourceConfig,
        items_path: &PathExpr,
        offset: usize,
        limit: usize,
    ) -> SourceResult<Option<Vec<RawDocument>>> {
        if offset > 0 && !config.url.contains("{offset}") {
            return Ok(None);
        }
        let url = Self::page_url(config, offset, limit);
        log::debug!("[{}] GET {}", config.id, url);

        let body = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::parse(format!("{url}: {e}")))?;

        let items = match items_path.select(&json).into_iter().next() {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(SourceError::parse(format!(
                    "{url}: expected an array at {items_path}, found {other}"
                )));
            }
        };

        items
            .iter()
            .map(|item| Self::to_document(config, item))
            .collect::<SourceResult<Vec<_>>>()
            .map(Some)
    }

    fn to_document(config: &SourceConfig, item: &Value) -> SourceResult<RawDocument> {
        let id = match item.get(&config.id_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(SourceError::parse(format!(
                    "item without a string or numeric '{}' field",
                    config.id_field
                )));
            }
        };
        Ok(RawDocument::new(id, item.clone()))
    }

    fn media_urls<'a>(&'a self, data: &'a Value) -> impl Iterator<Item = &'a str> {
        self.media_paths
            .iter()
            .flat_map(move |path| path.select(data))
            .filter_map(Value::as_str)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
    }
}

#[async_trait]
impl Source for HttpJsonSource {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn fetch(&self, ctx: &SourceContext<'_>) -> SourceResult<Vec<SourceQuery>> {
        ctx.logger.info(&format!("Querying {}", self.config.url));

        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        let items_path = self.items_path.clone();

        let query = async move {
            let pages = fetch_paginated(config.page_size, (), |offset, limit| {
                Self::fetch_page(&client, &config, &items_path, offset, limit)
            })
            .await?;
            Ok::<_, SourceError>(pages.into_items())
        };
        Ok(vec![SourceQuery::new(self.config.id.clone(), query)])
    }

    fn content(&self, namespace: &Namespace) -> SourceResult<ContentResult> {
        let media_downloads: Vec<MediaDownload> = namespace
            .documents()
            .flat_map(|doc| self.media_urls(doc.data()))
            .map(MediaDownload::new)
            .collect();

        let files = match &self.config.collate {
            Some(path) => ContentResult::collate(
                namespace.documents().map(|doc| {
                    ContentResult::new(
                        vec![DataFile::new(doc.id(), Value::Array(vec![doc.data().clone()]))],
                        Vec::new(),
                    )
                }),
                path,
            ),
            None => ContentResult::combine(namespace.documents().map(|doc| {
                ContentResult::new(vec![DataFile::new(doc.id(), doc.data().clone())], Vec::new())
            })),
        };

        Ok(ContentResult::new(files.data_files, media_downloads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DataStore;
    use serde_json::json;

    fn config(collate: Option<&str>) -> SourceConfig {
        SourceConfig {
            id: "posts".into(),
            url: "https://cms.example.com/posts?skip={offset}&take={limit}".into(),
            page_size: 2,
            items_path: "$.data".into(),
            id_field: "id".into(),
            media_paths: vec!["$.cover".into(), "$.gallery[*].src".into()],
            collate: collate.map(String::from),
        }
    }

    fn namespace() -> DataStore {
        let mut store = DataStore::new();
        store
            .create_namespace_from_map(
                "posts",
                vec![
                    (
                        "1".to_string(),
                        json!({"id": 1, "cover": "https://x/a.png", "gallery": [{"src": "https://x/b.png"}]}),
                    ),
                    ("2".to_string(), json!({"id": 2, "cover": "https://x/a.png"})),
                    ("3".to_string(), json!({"id": 3, "cover": "relative.png"})),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_page_url() {
        let config = config(None);
        assert_eq!(
            HttpJsonSource::page_url(&config, 4, 2),
            "https://cms.example.com/posts?skip=4&take=2"
        );
    }

    #[test]
    fn test_to_document_ids() {
        let config = config(None);
        let doc = HttpJsonSource::to_document(&config, &json!({"id": 7})).unwrap();
        assert_eq!(doc.id, "7");
        let doc = HttpJsonSource::to_document(&config, &json!({"id": "abc"})).unwrap();
        assert_eq!(doc.id, "abc");
        assert!(matches!(
            HttpJsonSource::to_document(&config, &json!({"title": "no id"})),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_content_extracts_media() {
        let source = HttpJsonSource::new(config(None), Client::new()).unwrap();
        let store = namespace();
        let content = source.content(store.namespace("posts").unwrap()).unwrap();

        assert_eq!(content.data_files.len(), 3);
        let urls: Vec<_> = content.media_downloads.iter().map(|m| m.url.as_str()).collect();
        // duplicates are left for the downloader to collapse
        assert_eq!(urls, vec!["https://x/a.png", "https://x/b.png", "https://x/a.png"]);
    }

    #[test]
    fn test_content_collates() {
        let source = HttpJsonSource::new(config(Some("posts")), Client::new()).unwrap();
        let store = namespace();
        let content = source.content(store.namespace("posts").unwrap()).unwrap();

        assert_eq!(content.data_files.len(), 1);
        assert_eq!(content.data_files[0].content.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unresponsive_endpoint_fails_the_query() {
        use crate::models::{Config, HttpConfig};
        use crate::utils::Logger;
        use crate::utils::http::create_async_client;
        use std::time::Duration;

        // Accepts into the backlog, never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = config(None);
        cfg.url = format!("http://{}/posts", listener.local_addr().unwrap());
        let client = create_async_client(&HttpConfig {
            timeout_secs: 1,
            ..HttpConfig::default()
        })
        .unwrap();
        let source = HttpJsonSource::new(cfg, client).unwrap();

        let run_config = Config::default();
        let store = DataStore::new();
        let ctx = SourceContext {
            logger: Logger::new("test"),
            config: &run_config,
            store: &store,
        };
        let mut queries = source.fetch(&ctx).await.unwrap();
        let query = queries.remove(0);

        let result = tokio::time::timeout(Duration::from_secs(5), query.data)
            .await
            .expect("query should fail on its own");
        assert!(matches!(result, Err(SourceError::Fetch(_))));
        drop(listener);
    }

    #[test]
    fn test_invalid_media_path_is_config_error() {
        let mut bad = config(None);
        bad.media_paths = vec!["cover".into()];
        assert!(matches!(
            HttpJsonSource::new(bad, Client::new()),
            Err(SourceError::Config(_))
        ));
    }
}
